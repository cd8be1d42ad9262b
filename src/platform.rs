//! Boundary between the moderation logic and the messaging platform.
//!
//! Handlers only ever talk to the platform through [`Platform`], so the
//! Telegram client can be swapped for a recording fake in tests.

use async_trait::async_trait;

/// Capabilities applied to a chat member. `true` means allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionSet {
    pub send_messages: bool,
    pub send_audios: bool,
    pub send_documents: bool,
    pub send_photos: bool,
    pub send_videos: bool,
    pub send_video_notes: bool,
    pub send_voice_notes: bool,
    pub send_polls: bool,
    pub send_other_messages: bool,
    pub add_web_page_previews: bool,
    pub change_info: bool,
    pub invite_users: bool,
    pub pin_messages: bool,
    pub manage_topics: bool,
}

/// Membership status of a user in a chat, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Creator => "creator",
            MembershipStatus::Administrator => "administrator",
            MembershipStatus::Member => "member",
            MembershipStatus::Restricted => "restricted",
            MembershipStatus::Left => "left",
            MembershipStatus::Kicked => "kicked",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The request reached the platform and was refused.
    #[error("platform API error: {0}")]
    Api(String),

    /// The request never got an answer.
    #[error("network error: {0}")]
    Network(String),
}

/// Operations the bot needs from the messaging platform.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn restrict_member(
        &self,
        group: i64,
        user: i64,
        permissions: PermissionSet,
    ) -> Result<(), PlatformError>;

    async fn ban_member(&self, group: i64, user: i64) -> Result<(), PlatformError>;

    async fn unban_member(&self, group: i64, user: i64) -> Result<(), PlatformError>;

    /// Send a plain-text message and return the id of the sent message.
    async fn send_message(&self, chat: i64, text: &str) -> Result<i32, PlatformError>;

    async fn delete_message(&self, chat: i64, message_id: i32) -> Result<(), PlatformError>;

    async fn membership_status(
        &self,
        group: i64,
        user: i64,
    ) -> Result<MembershipStatus, PlatformError>;
}
