//! Telegram side of the bot: the `teloxide` implementation of [`Platform`]
//! and the dispatcher that feeds decoded events to the handlers.

use crate::event::{BotEvent, CommandName, Member};
use crate::handlers::Handlers;
use crate::platform::{MembershipStatus, PermissionSet, Platform, PlatformError};
use async_trait::async_trait;
use reqwest::Url;
use std::convert::Infallible;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use teloxide::RequestError;
use teloxide::dispatching::{DefaultKey, UpdateHandler};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::{ChatPermissions, MessageId, User};
use teloxide::update_listeners::{UpdateListener, webhooks};
use teloxide::utils::command::BotCommands;

/// Handlers wired to the live Telegram client.
pub type BotHandlers = Handlers<TelegramPlatform>;

#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(bot: Bot) -> Self {
        TelegramPlatform { bot }
    }
}

impl From<RequestError> for PlatformError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Network(e) => PlatformError::Network(e.to_string()),
            other => PlatformError::Api(other.to_string()),
        }
    }
}

fn chat_permissions(set: PermissionSet) -> ChatPermissions {
    let mut perms = ChatPermissions::empty();
    perms.set(ChatPermissions::SEND_MESSAGES, set.send_messages);
    perms.set(ChatPermissions::SEND_AUDIOS, set.send_audios);
    perms.set(ChatPermissions::SEND_DOCUMENTS, set.send_documents);
    perms.set(ChatPermissions::SEND_PHOTOS, set.send_photos);
    perms.set(ChatPermissions::SEND_VIDEOS, set.send_videos);
    perms.set(ChatPermissions::SEND_VIDEO_NOTES, set.send_video_notes);
    perms.set(ChatPermissions::SEND_VOICE_NOTES, set.send_voice_notes);
    perms.set(ChatPermissions::SEND_POLLS, set.send_polls);
    perms.set(ChatPermissions::SEND_OTHER_MESSAGES, set.send_other_messages);
    perms.set(ChatPermissions::ADD_WEB_PAGE_PREVIEWS, set.add_web_page_previews);
    perms.set(ChatPermissions::CHANGE_INFO, set.change_info);
    perms.set(ChatPermissions::INVITE_USERS, set.invite_users);
    perms.set(ChatPermissions::PIN_MESSAGES, set.pin_messages);
    perms.set(ChatPermissions::MANAGE_TOPICS, set.manage_topics);
    perms
}

fn user_id(id: i64) -> UserId {
    UserId(id as u64)
}

#[async_trait]
impl Platform for TelegramPlatform {
    async fn restrict_member(
        &self,
        group: i64,
        user: i64,
        permissions: PermissionSet,
    ) -> Result<(), PlatformError> {
        self.bot
            .restrict_chat_member(ChatId(group), user_id(user), chat_permissions(permissions))
            .await?;
        Ok(())
    }

    async fn ban_member(&self, group: i64, user: i64) -> Result<(), PlatformError> {
        self.bot.ban_chat_member(ChatId(group), user_id(user)).await?;
        Ok(())
    }

    async fn unban_member(&self, group: i64, user: i64) -> Result<(), PlatformError> {
        // Without the flag Telegram also removes a member who is not banned.
        self.bot
            .unban_chat_member(ChatId(group), user_id(user))
            .only_if_banned(true)
            .await?;
        Ok(())
    }

    async fn send_message(&self, chat: i64, text: &str) -> Result<i32, PlatformError> {
        let sent = self.bot.send_message(ChatId(chat), text).await?;
        Ok(sent.id.0)
    }

    async fn delete_message(&self, chat: i64, message_id: i32) -> Result<(), PlatformError> {
        self.bot
            .delete_message(ChatId(chat), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn membership_status(
        &self,
        group: i64,
        user: i64,
    ) -> Result<MembershipStatus, PlatformError> {
        let member = self
            .bot
            .get_chat_member(ChatId(group), user_id(user))
            .await?;
        let kind = &member.kind;
        let status = if kind.is_owner() {
            MembershipStatus::Creator
        } else if kind.is_administrator() {
            MembershipStatus::Administrator
        } else if kind.is_restricted() {
            MembershipStatus::Restricted
        } else if kind.is_left() {
            MembershipStatus::Left
        } else if kind.is_banned() {
            MembershipStatus::Kicked
        } else {
            MembershipStatus::Member
        };
        Ok(status)
    }
}

fn member_from_user(user: &User) -> Member {
    Member {
        id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|name| !name.is_empty()),
        last_name: user.last_name.clone(),
        is_bot: user.is_bot,
    }
}

/// Commands as typed in the chat. `/unban_id` is an older spelling of `/unban`.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase")]
enum ChatCommand {
    Verify(String),
    Reject(String),
    ListPending,
    Help,
    Start,
    Unban(String),
    #[command(rename = "unban_id")]
    UnbanId(String),
}

impl ChatCommand {
    fn into_parts(self) -> (CommandName, Vec<String>) {
        let (name, args) = match self {
            ChatCommand::Verify(args) => (CommandName::Verify, args),
            ChatCommand::Reject(args) => (CommandName::Reject, args),
            ChatCommand::ListPending => (CommandName::ListPending, String::new()),
            ChatCommand::Help => (CommandName::Help, String::new()),
            ChatCommand::Start => (CommandName::Start, String::new()),
            ChatCommand::Unban(args) | ChatCommand::UnbanId(args) => (CommandName::Unban, args),
        };
        (name, args.split_whitespace().map(str::to_string).collect())
    }
}

/// Unknown commands, plain text and commands addressed to another bot yield
/// `None`. Without a known username only unaddressed commands are accepted.
fn parse_command(text: &str, bot_username: Option<&str>) -> Option<(CommandName, Vec<String>)> {
    let command = ChatCommand::parse(text, bot_username.unwrap_or_default()).ok()?;
    Some(command.into_parts())
}

/// Decode a raw message into an event the handlers understand.
///
/// Only group chats are moderated; anything else yields `None`.
pub fn decode_message(msg: &Message, bot_username: Option<&str>) -> Option<BotEvent> {
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return None;
    }
    let group_id = msg.chat.id.0;

    if let Some(users) = msg.new_chat_members() {
        let members: Vec<Member> = users.iter().map(member_from_user).collect();
        if members.is_empty() {
            return None;
        }
        let inviter = msg
            .from
            .as_ref()
            .map(|from| from.id.0 as i64)
            .filter(|id| !members.iter().any(|m| m.id == *id));
        return Some(BotEvent::NewMembers {
            group_id,
            members,
            inviter,
        });
    }

    let (name, args) = parse_command(msg.text()?, bot_username)?;
    let invoker = member_from_user(msg.from.as_ref()?);
    Some(BotEvent::Command {
        group_id,
        invoker,
        name,
        args,
    })
}

/// What the dispatcher endpoint needs besides the message itself.
pub struct BotContext {
    pub handlers: BotHandlers,
    pub bot_username: Option<String>,
}

async fn on_message(ctx: Arc<BotContext>, msg: Message) -> anyhow::Result<()> {
    if let Some(event) = decode_message(&msg, ctx.bot_username.as_deref()) {
        ctx.handlers.process_event(event).await;
    }
    Ok(())
}

fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry().branch(Update::filter_message().endpoint(on_message))
}

fn dispatcher(bot: Bot, ctx: Arc<BotContext>) -> Dispatcher<Bot, anyhow::Error, DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
}

/// Long-poll Telegram until Ctrl-C.
pub async fn run_polling(bot: Bot, ctx: Arc<BotContext>) {
    dispatcher(bot, ctx).dispatch().await;
}

/// Register `url` as the webhook and return the listener together with the
/// axum routes that feed it. The routes must be served on `addr`.
pub async fn webhook_listener(
    bot: Bot,
    addr: SocketAddr,
    url: Url,
) -> anyhow::Result<(impl UpdateListener<Err = Infallible>, axum::Router)> {
    log::info!("Registering webhook at {}", url);
    let options = webhooks::Options::new(addr, url);
    let (listener, _stop, routes) = webhooks::axum_to_router(bot, options).await?;
    Ok((listener, routes))
}

/// Dispatch updates pushed through `listener` until Ctrl-C.
pub async fn run_webhook<L>(bot: Bot, ctx: Arc<BotContext>, listener: L)
where
    L: UpdateListener + Send,
    L::Err: Debug,
{
    let mut dispatcher = dispatcher(bot, ctx);
    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("Webhook listener failed"),
        )
        .await;
}
