//! Registry of members waiting for an admin decision.
//!
//! Entries are keyed by (group, candidate). One mutex guards the whole map and
//! is only held for the in-memory operation itself, never across a platform
//! call. Reads hand out clones.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A candidate restricted in a group until verified or rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVerification {
    pub group_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Welcome notice sent when the member joined.
    pub message_id: Option<i32>,
    pub joined_at: DateTime<Utc>,
}

impl PendingVerification {
    pub fn display_name(&self) -> String {
        crate::policy::display_name(
            self.user_id,
            self.username.as_deref(),
            self.first_name.as_deref(),
            self.last_name.as_deref(),
        )
    }
}

#[derive(Default)]
pub struct PendingRegistry {
    groups: Mutex<HashMap<i64, HashMap<i64, PendingVerification>>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // No operation can panic halfway through a map update, so a poisoned
    // lock still guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, HashMap<i64, HashMap<i64, PendingVerification>>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a pending verification. Overwrites any entry for the same key
    /// and returns the one it replaced.
    pub fn add(
        &self,
        group_id: i64,
        user_id: i64,
        username: Option<String>,
        first_name: Option<String>,
        last_name: Option<String>,
        message_id: Option<i32>,
    ) -> Option<PendingVerification> {
        let entry = PendingVerification {
            group_id,
            user_id,
            username,
            first_name,
            last_name,
            message_id,
            joined_at: Utc::now(),
        };
        let replaced = self
            .lock()
            .entry(group_id)
            .or_default()
            .insert(user_id, entry);
        log::debug!(
            "Added pending verification for user {} in chat {} (replaced={})",
            user_id,
            group_id,
            replaced.is_some()
        );
        replaced
    }

    /// Attach the welcome notice to a still-pending entry. Returns `false` if
    /// the entry was resolved in the meantime.
    pub fn set_message_id(&self, group_id: i64, user_id: i64, message_id: i32) -> bool {
        match self
            .lock()
            .get_mut(&group_id)
            .and_then(|users| users.get_mut(&user_id))
        {
            Some(entry) => {
                entry.message_id = Some(message_id);
                true
            }
            None => false,
        }
    }

    /// Put back an entry claimed by [`remove`](Self::remove) whose resolution
    /// failed. A newer entry recorded in the meantime wins.
    pub fn restore(&self, entry: PendingVerification) -> bool {
        let (group_id, user_id) = (entry.group_id, entry.user_id);
        let mut groups = self.lock();
        let users = groups.entry(group_id).or_default();
        if users.contains_key(&user_id) {
            return false;
        }
        users.insert(user_id, entry);
        drop(groups);

        log::debug!(
            "Restored pending verification for user {} in chat {}",
            user_id,
            group_id
        );
        true
    }

    pub fn get(&self, group_id: i64, user_id: i64) -> Option<PendingVerification> {
        self.lock()
            .get(&group_id)
            .and_then(|users| users.get(&user_id))
            .cloned()
    }

    /// Remove and return an entry. Of several concurrent callers for the same
    /// key, only one gets `Some`.
    pub fn remove(&self, group_id: i64, user_id: i64) -> Option<PendingVerification> {
        let mut groups = self.lock();
        let users = groups.get_mut(&group_id)?;
        let removed = users.remove(&user_id);
        if users.is_empty() {
            groups.remove(&group_id);
        }
        drop(groups);

        if removed.is_some() {
            log::debug!(
                "Removed pending verification for user {} in chat {}",
                user_id,
                group_id
            );
        }
        removed
    }

    /// Snapshot of every entry pending in a group, oldest first.
    pub fn list_all(&self, group_id: i64) -> Vec<PendingVerification> {
        let mut entries: Vec<PendingVerification> = self
            .lock()
            .get(&group_id)
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then(a.user_id.cmp(&b.user_id))
        });
        entries
    }

    /// Look up a pending entry by handle, ignoring case and a leading '@'.
    pub fn find_by_handle(&self, group_id: i64, handle: &str) -> Option<PendingVerification> {
        let handle = handle.trim_start_matches('@');
        if handle.is_empty() {
            return None;
        }
        self.lock().get(&group_id).and_then(|users| {
            users
                .values()
                .find(|entry| {
                    entry
                        .username
                        .as_deref()
                        .is_some_and(|u| u.eq_ignore_ascii_case(handle))
                })
                .cloned()
        })
    }

    /// Number of pending entries across all groups.
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
