use crate::event::{BotEvent, CommandName, Member};
use crate::pending::{PendingRegistry, PendingVerification};
use crate::platform::Platform;
use crate::policy::{full_permissions, is_administrator, restricted_permissions};
use crate::replies;
use anyhow::Result;
use std::sync::Arc;

/// Who a `/verify` or `/reject` command is aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Id(i64),
    Handle(String),
}

impl Target {
    /// Accept a positive numeric id or an `@handle`.
    fn parse(arg: &str) -> Option<Self> {
        if let Some(handle) = arg.strip_prefix('@') {
            let valid = !handle.is_empty()
                && handle
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            return valid.then(|| Target::Handle(handle.to_string()));
        }
        arg.parse::<i64>().ok().filter(|id| *id > 0).map(Target::Id)
    }
}

/// Routes inbound events to registry updates and platform calls.
pub struct Handlers<P> {
    platform: P,
    registry: Arc<PendingRegistry>,
    bot_user_id: Option<i64>,
}

impl<P: Platform> Handlers<P> {
    pub fn new(platform: P, registry: Arc<PendingRegistry>, bot_user_id: Option<i64>) -> Self {
        Handlers {
            platform,
            registry,
            bot_user_id,
        }
    }

    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }

    /// Handle one inbound event. Failures are logged, never propagated.
    pub async fn process_event(&self, event: BotEvent) {
        let group_id = event.group_id();
        let result = match event {
            BotEvent::NewMembers {
                group_id,
                members,
                inviter,
            } => self.on_new_members(group_id, &members, inviter).await,
            BotEvent::Command {
                group_id,
                invoker,
                name,
                args,
            } => {
                log::info!(
                    "Processing /{} from user {} in chat {}",
                    name.as_str(),
                    invoker.id,
                    group_id
                );
                match name {
                    CommandName::Verify => self.on_verify(group_id, &invoker, &args).await,
                    CommandName::Reject => self.on_reject(group_id, &invoker, &args).await,
                    CommandName::ListPending => self.on_list_pending(group_id, &invoker).await,
                    CommandName::Unban => self.on_unban(group_id, &invoker, &args).await,
                    CommandName::Help => self.on_help(group_id).await,
                    CommandName::Start => self.on_start(group_id).await,
                }
            }
        };
        if let Err(e) = result {
            log::error!("Failed to handle event in chat {}: {:#}", group_id, e);
        }
    }

    /// Restrict every newly joined member and record them as pending.
    pub async fn on_new_members(
        &self,
        group_id: i64,
        members: &[Member],
        inviter: Option<i64>,
    ) -> Result<()> {
        for member in members {
            if Some(member.id) == self.bot_user_id {
                log::info!("Bot was added to group {}", group_id);
                continue;
            }

            if let Err(e) = self
                .platform
                .restrict_member(group_id, member.id, restricted_permissions())
                .await
            {
                log::error!(
                    "Error restricting new member {} in chat {}: {}",
                    member.id,
                    group_id,
                    e
                );
                continue;
            }

            // Pending from here on; the notice id is attached once sent.
            let replaced = self.registry.add(
                group_id,
                member.id,
                member.username.clone(),
                member.first_name.clone(),
                member.last_name.clone(),
                None,
            );
            if let Some(previous) = replaced {
                log::info!(
                    "User {} rejoined chat {} while pending, replacing the old entry",
                    member.id,
                    group_id
                );
                self.clear_welcome(&previous).await;
            }
            log::info!(
                "New member {} (bot={}) restricted in chat {} (invited by {:?})",
                member.id,
                member.is_bot,
                group_id,
                inviter
            );

            let welcome = replies::welcome(&member.display_name(), member.id);
            match self.platform.send_message(group_id, &welcome).await {
                Ok(message_id) => {
                    if !self.registry.set_message_id(group_id, member.id, message_id) {
                        // Resolved while the notice was in flight.
                        self.delete_notice(group_id, message_id).await;
                    }
                }
                Err(e) => log::warn!(
                    "Restricted user {} in chat {} but the welcome notice failed: {}",
                    member.id,
                    group_id,
                    e
                ),
            }
        }
        Ok(())
    }

    /// Grant full permissions to a pending member.
    pub async fn on_verify(&self, group_id: i64, invoker: &Member, args: &[String]) -> Result<()> {
        let Some(entry) = self.claim_target(group_id, invoker, args, "verify").await? else {
            return Ok(());
        };

        if let Err(e) = self
            .platform
            .restrict_member(group_id, entry.user_id, full_permissions())
            .await
        {
            log::error!(
                "Error verifying user {} in chat {}: {}",
                entry.user_id,
                group_id,
                e
            );
            self.registry.restore(entry);
            self.reply(group_id, &replies::action_failed("verify")).await?;
            return Ok(());
        }

        log::info!(
            "User {} verified in chat {} by admin {}",
            entry.user_id,
            group_id,
            invoker.id
        );
        self.clear_welcome(&entry).await;
        self.reply(
            group_id,
            &replies::verified(&entry.display_name(), &invoker.display_name()),
        )
        .await
    }

    /// Kick a pending member: ban, then unban right away.
    pub async fn on_reject(&self, group_id: i64, invoker: &Member, args: &[String]) -> Result<()> {
        let Some(entry) = self.claim_target(group_id, invoker, args, "reject").await? else {
            return Ok(());
        };

        if let Err(e) = self.platform.ban_member(group_id, entry.user_id).await {
            log::error!(
                "Error rejecting user {} in chat {}: {}",
                entry.user_id,
                group_id,
                e
            );
            self.registry.restore(entry);
            self.reply(group_id, &replies::action_failed("reject")).await?;
            return Ok(());
        }

        if let Err(e) = self.platform.unban_member(group_id, entry.user_id).await {
            log::warn!(
                "User {} was banned from chat {} but the follow-up unban failed: {}",
                entry.user_id,
                group_id,
                e
            );
        }

        log::info!(
            "User {} rejected in chat {} by admin {}",
            entry.user_id,
            group_id,
            invoker.id
        );
        self.clear_welcome(&entry).await;
        self.reply(
            group_id,
            &replies::rejected(&entry.display_name(), &invoker.display_name()),
        )
        .await
    }

    pub async fn on_list_pending(&self, group_id: i64, invoker: &Member) -> Result<()> {
        if !self.require_admin(group_id, invoker).await? {
            return Ok(());
        }
        let entries = self.registry.list_all(group_id);
        self.reply(group_id, &replies::pending_list(&entries)).await
    }

    /// Lift a ban by numeric id. The registry is not involved.
    pub async fn on_unban(&self, group_id: i64, invoker: &Member, args: &[String]) -> Result<()> {
        if !self.require_admin(group_id, invoker).await? {
            return Ok(());
        }
        let Some(arg) = args.first() else {
            return self.reply(group_id, &replies::usage("unban")).await;
        };
        let Some(user_id) = arg.parse::<i64>().ok().filter(|id| *id > 0) else {
            return self.reply(group_id, replies::INVALID_USER_ID).await;
        };

        if self.registry.get(group_id, user_id).is_some() {
            log::info!(
                "User {} is still pending in chat {}; unban leaves the restriction in place",
                user_id,
                group_id
            );
        }
        match self.platform.unban_member(group_id, user_id).await {
            Ok(()) => {
                log::info!(
                    "User {} unbanned in chat {} by admin {}",
                    user_id,
                    group_id,
                    invoker.id
                );
                self.reply(group_id, &replies::unbanned(user_id)).await
            }
            Err(e) => {
                log::error!("Error unbanning user {} in chat {}: {}", user_id, group_id, e);
                self.reply(group_id, &replies::action_failed("unban")).await
            }
        }
    }

    pub async fn on_help(&self, group_id: i64) -> Result<()> {
        self.reply(group_id, replies::HELP).await
    }

    pub async fn on_start(&self, group_id: i64) -> Result<()> {
        self.reply(group_id, replies::START).await
    }

    /// Admin check, argument parsing and registry removal shared by verify and
    /// reject. Returns the claimed entry, or `None` once the invoker has been
    /// answered.
    async fn claim_target(
        &self,
        group_id: i64,
        invoker: &Member,
        args: &[String],
        command: &str,
    ) -> Result<Option<PendingVerification>> {
        if !self.require_admin(group_id, invoker).await? {
            return Ok(None);
        }

        let Some(arg) = args.first() else {
            self.reply(group_id, &replies::usage(command)).await?;
            return Ok(None);
        };
        let Some(target) = Target::parse(arg) else {
            self.reply(group_id, replies::INVALID_USER_ID).await?;
            return Ok(None);
        };

        let user_id = match target {
            Target::Id(id) => Some(id),
            Target::Handle(handle) => self
                .registry
                .find_by_handle(group_id, &handle)
                .map(|entry| entry.user_id),
        };

        match user_id.and_then(|id| self.registry.remove(group_id, id)) {
            Some(entry) => Ok(Some(entry)),
            None => {
                log::info!(
                    "/{} for {} in chat {}: not pending",
                    command,
                    arg,
                    group_id
                );
                self.reply(group_id, replies::NOT_PENDING).await?;
                Ok(None)
            }
        }
    }

    /// Ask the platform whether the invoker administers the chat. Admin lists
    /// change, so this is never cached.
    async fn require_admin(&self, group_id: i64, invoker: &Member) -> Result<bool> {
        let status = match self.platform.membership_status(group_id, invoker.id).await {
            Ok(status) => Some(status),
            Err(e) => {
                log::error!(
                    "Error checking admin status for user {} in chat {}: {}",
                    invoker.id,
                    group_id,
                    e
                );
                self.reply(group_id, replies::ADMIN_CHECK_FAILED).await?;
                return Ok(false);
            }
        };

        if is_administrator(status) {
            return Ok(true);
        }
        log::info!(
            "Denied admin command to user {} ({}) in chat {}",
            invoker.display_name(),
            status.map(|s| s.as_str()).unwrap_or("unknown"),
            group_id
        );
        self.reply(group_id, replies::ADMIN_ONLY).await?;
        Ok(false)
    }

    /// Best effort: the join notice is stale once the member is resolved.
    async fn clear_welcome(&self, entry: &PendingVerification) {
        if let Some(message_id) = entry.message_id {
            self.delete_notice(entry.group_id, message_id).await;
        }
    }

    async fn delete_notice(&self, group_id: i64, message_id: i32) {
        if let Err(e) = self.platform.delete_message(group_id, message_id).await {
            log::warn!(
                "Could not delete welcome notice {} in chat {}: {}",
                message_id,
                group_id,
                e
            );
        }
    }

    async fn reply(&self, chat: i64, text: &str) -> Result<()> {
        self.platform.send_message(chat, text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MembershipStatus, PermissionSet, PlatformError};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Restrict(i64, i64, PermissionSet),
        Ban(i64, i64),
        Unban(i64, i64),
        Send(i64, String),
        Delete(i64, i32),
    }

    type SendHook = Box<dyn Fn(&str) + Send + Sync>;

    /// Records every call; moderation calls yield once so concurrent
    /// handlers interleave.
    #[derive(Default)]
    struct FakePlatform {
        calls: Mutex<Vec<Call>>,
        statuses: HashMap<(i64, i64), MembershipStatus>,
        failing: HashSet<&'static str>,
        next_message_id: Mutex<i32>,
        on_send: Option<SendHook>,
    }

    impl FakePlatform {
        fn with_admin(group_id: i64, user_id: i64) -> Self {
            let mut platform = FakePlatform::default();
            platform
                .statuses
                .insert((group_id, user_id), MembershipStatus::Administrator);
            platform
        }

        fn failing(mut self, operation: &'static str) -> Self {
            self.failing.insert(operation);
            self
        }

        /// Run `hook` while a message is being sent.
        fn on_send(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
            self.on_send = Some(Box::new(hook));
            self
        }

        fn check(&self, operation: &'static str) -> Result<(), PlatformError> {
            if self.failing.contains(operation) {
                return Err(PlatformError::Api(format!("{} refused", operation)));
            }
            Ok(())
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn moderation_calls(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| !matches!(c, Call::Send(..) | Call::Delete(..)))
                .collect()
        }

        fn sent(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Send(_, text) => Some(text),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Platform for FakePlatform {
        async fn restrict_member(
            &self,
            group: i64,
            user: i64,
            permissions: PermissionSet,
        ) -> Result<(), PlatformError> {
            tokio::task::yield_now().await;
            self.check("restrict")?;
            self.record(Call::Restrict(group, user, permissions));
            Ok(())
        }

        async fn ban_member(&self, group: i64, user: i64) -> Result<(), PlatformError> {
            tokio::task::yield_now().await;
            self.check("ban")?;
            self.record(Call::Ban(group, user));
            Ok(())
        }

        async fn unban_member(&self, group: i64, user: i64) -> Result<(), PlatformError> {
            self.check("unban")?;
            self.record(Call::Unban(group, user));
            Ok(())
        }

        async fn send_message(&self, chat: i64, text: &str) -> Result<i32, PlatformError> {
            self.check("send")?;
            if let Some(hook) = &self.on_send {
                hook(text);
            }
            self.record(Call::Send(chat, text.to_string()));
            let mut id = self.next_message_id.lock().unwrap();
            *id += 1;
            Ok(*id)
        }

        async fn delete_message(&self, chat: i64, message_id: i32) -> Result<(), PlatformError> {
            self.check("delete")?;
            self.record(Call::Delete(chat, message_id));
            Ok(())
        }

        async fn membership_status(
            &self,
            group: i64,
            user: i64,
        ) -> Result<MembershipStatus, PlatformError> {
            self.check("status")?;
            Ok(self
                .statuses
                .get(&(group, user))
                .copied()
                .unwrap_or(MembershipStatus::Member))
        }
    }

    const GROUP: i64 = 1;
    const ADMIN: i64 = 10;

    fn member(id: i64, username: Option<&str>) -> Member {
        Member {
            id,
            username: username.map(str::to_string),
            first_name: Some(format!("User{}", id)),
            last_name: None,
            is_bot: false,
        }
    }

    fn admin() -> Member {
        member(ADMIN, Some("admin"))
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn handlers(platform: FakePlatform) -> Handlers<FakePlatform> {
        Handlers::new(platform, Arc::new(PendingRegistry::new()), Some(999))
    }

    async fn join_bob(h: &Handlers<FakePlatform>) {
        h.on_new_members(GROUP, &[member(100, Some("bob"))], None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_new_member_is_restricted_and_pending() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));
        join_bob(&h).await;

        let entry = h.registry().get(GROUP, 100).unwrap();
        assert_eq!(entry.username.as_deref(), Some("bob"));
        assert_eq!(entry.message_id, Some(1));
        assert_eq!(
            h.platform.moderation_calls(),
            vec![Call::Restrict(GROUP, 100, restricted_permissions())]
        );
        assert!(h.platform.sent()[0].contains("Welcome @bob!"));
    }

    #[tokio::test]
    async fn test_new_member_skips_the_bot_itself() {
        let h = handlers(FakePlatform::default());
        h.on_new_members(GROUP, &[member(999, Some("gatebot"))], Some(ADMIN))
            .await
            .unwrap();

        assert!(h.registry().is_empty());
        assert!(h.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_restriction_leaves_member_absent() {
        let h = handlers(FakePlatform::default().failing("restrict"));
        join_bob(&h).await;

        assert!(h.registry().get(GROUP, 100).is_none());
        assert!(h.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_welcome_still_records_member() {
        let h = handlers(FakePlatform::default().failing("send"));
        join_bob(&h).await;

        let entry = h.registry().get(GROUP, 100).unwrap();
        assert_eq!(entry.message_id, None);
    }

    #[tokio::test]
    async fn test_member_is_pending_before_welcome_is_sent() {
        let registry = Arc::new(PendingRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let platform = {
            let registry = Arc::clone(&registry);
            let seen = Arc::clone(&seen);
            FakePlatform::default().on_send(move |_| {
                seen.lock().unwrap().push(registry.get(GROUP, 100).is_some());
            })
        };
        let h = Handlers::new(platform, registry, None);
        join_bob(&h).await;

        assert_eq!(*seen.lock().unwrap(), vec![true]);
        assert_eq!(h.registry().get(GROUP, 100).unwrap().message_id, Some(1));
    }

    #[tokio::test]
    async fn test_welcome_removed_when_resolved_while_sending() {
        let registry = Arc::new(PendingRegistry::new());
        let platform = {
            let registry = Arc::clone(&registry);
            FakePlatform::default().on_send(move |_| {
                registry.remove(GROUP, 100);
            })
        };
        let h = Handlers::new(platform, registry, None);
        join_bob(&h).await;

        assert!(h.registry().is_empty());
        assert!(h.platform.calls().contains(&Call::Delete(GROUP, 1)));
    }

    #[tokio::test]
    async fn test_rejoin_replaces_entry_and_clears_old_welcome() {
        let h = handlers(FakePlatform::default());
        join_bob(&h).await;
        join_bob(&h).await;

        assert_eq!(h.registry().len(), 1);
        assert_eq!(h.registry().get(GROUP, 100).unwrap().message_id, Some(2));
        let deletes: Vec<Call> = h
            .platform
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Delete(..)))
            .collect();
        assert_eq!(deletes, vec![Call::Delete(GROUP, 1)]);
    }

    #[tokio::test]
    async fn test_join_then_verify() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));
        join_bob(&h).await;
        assert!(h.registry().get(GROUP, 100).is_some());

        h.on_verify(GROUP, &admin(), &args(&["100"])).await.unwrap();

        assert!(h.registry().get(GROUP, 100).is_none());
        let restores: Vec<Call> = h
            .platform
            .moderation_calls()
            .into_iter()
            .filter(|c| *c == Call::Restrict(GROUP, 100, full_permissions()))
            .collect();
        assert_eq!(restores.len(), 1);
        assert_eq!(
            h.platform.sent().last().unwrap(),
            "✅ @bob has been verified by @admin. Welcome to the group!"
        );
        assert!(h.platform.calls().contains(&Call::Delete(GROUP, 1)));
    }

    #[tokio::test]
    async fn test_failed_welcome_cleanup_does_not_block_verify() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN).failing("delete"));
        join_bob(&h).await;

        h.on_verify(GROUP, &admin(), &args(&["100"])).await.unwrap();

        assert!(h.registry().get(GROUP, 100).is_none());
        assert!(h.platform.sent().last().unwrap().contains("has been verified"));
    }

    #[tokio::test]
    async fn test_join_then_reject_kicks() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));
        join_bob(&h).await;

        h.on_reject(GROUP, &admin(), &args(&["100"])).await.unwrap();

        assert!(h.registry().get(GROUP, 100).is_none());
        assert_eq!(
            h.platform.moderation_calls(),
            vec![
                Call::Restrict(GROUP, 100, restricted_permissions()),
                Call::Ban(GROUP, 100),
                Call::Unban(GROUP, 100),
            ]
        );
        assert!(h.platform.sent().last().unwrap().contains("has been rejected"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verify_resolves_once() {
        let h = Arc::new(handlers(FakePlatform::with_admin(GROUP, ADMIN)));
        join_bob(&h).await;

        let first = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.on_verify(GROUP, &admin(), &args(&["100"])).await })
        };
        let second = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.on_verify(GROUP, &admin(), &args(&["100"])).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let restores = h
            .platform
            .moderation_calls()
            .into_iter()
            .filter(|c| *c == Call::Restrict(GROUP, 100, full_permissions()))
            .count();
        assert_eq!(restores, 1);

        let sent = h.platform.sent();
        assert_eq!(sent.iter().filter(|t| t.contains("has been verified")).count(), 1);
        assert_eq!(sent.iter().filter(|t| *t == replies::NOT_PENDING).count(), 1);
        assert!(h.registry().is_empty());
    }

    #[tokio::test]
    async fn test_non_admin_reject_is_denied() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));
        join_bob(&h).await;
        let before = h.platform.moderation_calls();

        h.on_reject(GROUP, &member(200, None), &args(&["100"]))
            .await
            .unwrap();

        assert!(h.registry().get(GROUP, 100).is_some());
        assert_eq!(h.platform.moderation_calls(), before);
        assert_eq!(h.platform.sent().last().unwrap(), replies::ADMIN_ONLY);
    }

    #[tokio::test]
    async fn test_admin_check_failure_stops_command() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN).failing("status"));
        join_bob(&h).await;

        h.on_verify(GROUP, &admin(), &args(&["100"])).await.unwrap();

        assert!(h.registry().get(GROUP, 100).is_some());
        assert_eq!(h.platform.sent().last().unwrap(), replies::ADMIN_CHECK_FAILED);
    }

    #[tokio::test]
    async fn test_verify_not_pending() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));

        h.on_verify(GROUP, &admin(), &args(&["100"])).await.unwrap();

        assert!(h.platform.moderation_calls().is_empty());
        assert_eq!(h.platform.sent(), vec![replies::NOT_PENDING.to_string()]);
    }

    #[tokio::test]
    async fn test_verify_pending_in_other_group_only() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));
        h.on_new_members(2, &[member(100, Some("bob"))], None)
            .await
            .unwrap();

        h.on_verify(GROUP, &admin(), &args(&["100"])).await.unwrap();

        assert!(h.registry().get(2, 100).is_some());
        assert_eq!(h.platform.sent().last().unwrap(), replies::NOT_PENDING);
    }

    #[tokio::test]
    async fn test_malformed_arguments() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));
        join_bob(&h).await;

        h.on_verify(GROUP, &admin(), &[]).await.unwrap();
        assert_eq!(h.platform.sent().last().unwrap(), &replies::usage("verify"));

        for bad in ["abc", "-5", "0", "@", "@bad-handle"] {
            h.on_reject(GROUP, &admin(), &args(&[bad])).await.unwrap();
            assert_eq!(h.platform.sent().last().unwrap(), replies::INVALID_USER_ID);
        }
        assert!(h.registry().get(GROUP, 100).is_some());
    }

    #[tokio::test]
    async fn test_verify_by_handle() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));
        join_bob(&h).await;

        h.on_verify(GROUP, &admin(), &args(&["@Bob"])).await.unwrap();

        assert!(h.registry().get(GROUP, 100).is_none());
        assert!(h.platform.sent().last().unwrap().contains("has been verified"));
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_member_pending() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));
        join_bob(&h).await;
        let original = h.registry().get(GROUP, 100).unwrap();

        let failing = Handlers::new(
            FakePlatform::with_admin(GROUP, ADMIN).failing("restrict"),
            Arc::clone(h.registry()),
            None,
        );
        failing
            .on_verify(GROUP, &admin(), &args(&["100"]))
            .await
            .unwrap();

        assert_eq!(h.registry().get(GROUP, 100), Some(original));
        assert_eq!(
            failing.platform.sent().last().unwrap(),
            &replies::action_failed("verify")
        );
    }

    #[tokio::test]
    async fn test_failed_ban_keeps_member_pending() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN).failing("ban"));
        join_bob(&h).await;

        h.on_reject(GROUP, &admin(), &args(&["100"])).await.unwrap();

        assert!(h.registry().get(GROUP, 100).is_some());
        assert!(!h.platform.calls().iter().any(|c| matches!(c, Call::Unban(..))));
        assert_eq!(h.platform.sent().last().unwrap(), &replies::action_failed("reject"));
    }

    #[tokio::test]
    async fn test_failed_unban_still_resolves_reject() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN).failing("unban"));
        join_bob(&h).await;

        h.on_reject(GROUP, &admin(), &args(&["100"])).await.unwrap();

        assert!(h.registry().get(GROUP, 100).is_none());
        assert!(h.platform.sent().last().unwrap().contains("has been rejected"));
    }

    #[tokio::test]
    async fn test_list_pending() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));

        h.on_list_pending(GROUP, &admin()).await.unwrap();
        assert_eq!(h.platform.sent().last().unwrap(), replies::NONE_PENDING);

        join_bob(&h).await;
        h.on_list_pending(GROUP, &admin()).await.unwrap();
        let listing = h.platform.sent().last().unwrap().clone();
        assert!(listing.contains("@bob - ID: 100"));
        assert!(h.registry().get(GROUP, 100).is_some());

        h.on_list_pending(GROUP, &member(200, None)).await.unwrap();
        assert_eq!(h.platform.sent().last().unwrap(), replies::ADMIN_ONLY);
    }

    #[tokio::test]
    async fn test_unban_by_id() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));

        h.on_unban(GROUP, &admin(), &args(&["300"])).await.unwrap();
        assert_eq!(h.platform.moderation_calls(), vec![Call::Unban(GROUP, 300)]);
        assert_eq!(h.platform.sent().last().unwrap(), &replies::unbanned(300));

        h.on_unban(GROUP, &member(200, None), &args(&["300"]))
            .await
            .unwrap();
        assert_eq!(h.platform.moderation_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unban_leaves_pending_member_pending() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));
        join_bob(&h).await;

        h.on_unban(GROUP, &admin(), &args(&["100"])).await.unwrap();

        assert!(h.registry().get(GROUP, 100).is_some());
        assert_eq!(
            h.platform.moderation_calls(),
            vec![
                Call::Restrict(GROUP, 100, restricted_permissions()),
                Call::Unban(GROUP, 100),
            ]
        );
    }

    #[tokio::test]
    async fn test_process_event_routes_commands() {
        let h = handlers(FakePlatform::with_admin(GROUP, ADMIN));
        h.process_event(BotEvent::NewMembers {
            group_id: GROUP,
            members: vec![member(100, Some("bob"))],
            inviter: None,
        })
        .await;
        h.process_event(BotEvent::Command {
            group_id: GROUP,
            invoker: admin(),
            name: CommandName::Reject,
            args: args(&["100"]),
        })
        .await;
        h.process_event(BotEvent::Command {
            group_id: GROUP,
            invoker: member(200, None),
            name: CommandName::Help,
            args: vec![],
        })
        .await;

        assert!(h.registry().is_empty());
        assert_eq!(h.platform.sent().last().unwrap(), replies::HELP);
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(Target::parse("100"), Some(Target::Id(100)));
        assert_eq!(Target::parse("@bob_1"), Some(Target::Handle("bob_1".to_string())));
        assert_eq!(Target::parse("0"), None);
        assert_eq!(Target::parse("-1"), None);
        assert_eq!(Target::parse("bob"), None);
        assert_eq!(Target::parse("@"), None);
    }
}
