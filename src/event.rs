//! Inbound events, decoded once from the raw platform update.

/// A user as seen in an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_bot: bool,
}

impl Member {
    pub fn display_name(&self) -> String {
        crate::policy::display_name(
            self.id,
            self.username.as_deref(),
            self.first_name.as_deref(),
            self.last_name.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandName {
    Verify,
    Reject,
    ListPending,
    Help,
    Start,
    Unban,
}

impl CommandName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Verify => "verify",
            CommandName::Reject => "reject",
            CommandName::ListPending => "listpending",
            CommandName::Help => "help",
            CommandName::Start => "start",
            CommandName::Unban => "unban",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    /// One or more users joined a group.
    NewMembers {
        group_id: i64,
        members: Vec<Member>,
        inviter: Option<i64>,
    },
    /// A known command was sent to the bot.
    Command {
        group_id: i64,
        invoker: Member,
        name: CommandName,
        args: Vec<String>,
    },
}

impl BotEvent {
    pub fn group_id(&self) -> i64 {
        match self {
            BotEvent::NewMembers { group_id, .. } | BotEvent::Command { group_id, .. } => *group_id,
        }
    }
}
