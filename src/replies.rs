//! User-visible texts sent by the bot.

use crate::pending::PendingVerification;

pub const ADMIN_ONLY: &str = "Only admins can use this command.";
pub const ADMIN_CHECK_FAILED: &str = "Failed to verify admin status. Please try again later.";
pub const INVALID_USER_ID: &str = "Invalid user ID. Please use a numeric ID or @username.";
pub const NOT_PENDING: &str = "This user is not pending verification or has already been verified.";
pub const NONE_PENDING: &str = "No users are currently awaiting verification.";

pub const HELP: &str = "🤖 Verification Bot Help 🤖\n\n\
For Admins:\n\
/verify USER_ID - Approve a user and grant chat permissions\n\
/reject USER_ID - Remove a user from the group\n\
/listpending - Show all users awaiting verification\n\
/unban USER_ID - Lift a ban so the user can rejoin\n\
/help - Show this help message\n\n\
How it works:\n\
1. When new users join, they are restricted from sending messages\n\
2. An admin must verify them using the /verify command\n\
3. Once verified, users can participate in the chat\n\
4. Alternatively, admins can reject users with /reject";

pub const START: &str = "👋 Hi! I keep new members muted until an admin verifies them.\n\
Use /help to see the available commands.";

/// Usage line for a command that needs a target user.
pub fn usage(command: &str) -> String {
    format!(
        "Please specify a user ID to {}.\nUsage: /{} USER_ID",
        command, command
    )
}

pub fn welcome(name: &str, user_id: i64) -> String {
    format!(
        "👋 Welcome {}!\n\n\
         To prevent spam, you've been temporarily restricted from sending messages \
         in this group until an admin verifies you.\n\n\
         Admins can use /verify {} to approve or /reject {} to remove this user.",
        name, user_id, user_id
    )
}

pub fn verified(name: &str, admin: &str) -> String {
    format!(
        "✅ {} has been verified by {}. Welcome to the group!",
        name, admin
    )
}

pub fn rejected(name: &str, admin: &str) -> String {
    format!(
        "❌ {} has been rejected and removed from the group by {}.",
        name, admin
    )
}

pub fn unbanned(user_id: i64) -> String {
    format!("✅ User with ID {} has been unbanned.", user_id)
}

/// Generic failure reply for a moderation action that did not go through.
pub fn action_failed(action: &str) -> String {
    format!("Failed to {} user. Please try again later.", action)
}

/// Listing of everyone awaiting verification, with ready-to-use commands.
pub fn pending_list(entries: &[PendingVerification]) -> String {
    if entries.is_empty() {
        return NONE_PENDING.to_string();
    }

    let mut message = String::from("Users awaiting verification:\n\n");
    for entry in entries {
        message.push_str(&format!(
            "• {} - ID: {}\n  Commands: /verify {} | /reject {}\n\n",
            entry.display_name(),
            entry.user_id,
            entry.user_id,
            entry.user_id
        ));
    }
    message
}
