use crate::platform::{MembershipStatus, PermissionSet};

/// Permissions applied to a member who has not been verified yet.
pub fn restricted_permissions() -> PermissionSet {
    PermissionSet::default()
}

/// Permissions restored after verification. Chat info, pinning and topic
/// management stay with the admins.
pub fn full_permissions() -> PermissionSet {
    PermissionSet {
        send_messages: true,
        send_audios: true,
        send_documents: true,
        send_photos: true,
        send_videos: true,
        send_video_notes: true,
        send_voice_notes: true,
        send_polls: true,
        send_other_messages: true,
        add_web_page_previews: true,
        invite_users: true,
        change_info: false,
        pin_messages: false,
        manage_topics: false,
    }
}

/// Check if a membership status carries admin privileges.
pub fn is_administrator(status: Option<MembershipStatus>) -> bool {
    matches!(
        status,
        Some(MembershipStatus::Administrator) | Some(MembershipStatus::Creator)
    )
}

/// Render a user for chat messages: `@handle`, else "first last", else `User {id}`.
pub fn display_name(
    id: i64,
    handle: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> String {
    if let Some(handle) = handle.filter(|h| !h.is_empty()) {
        return format!("@{}", handle);
    }

    let full_name = [first_name, last_name]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !full_name.is_empty() {
        return full_name;
    }

    format!("User {}", id)
}
