//! Tracker - collection of per-user states.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use domain::{Email, LogEntry, NodeName, SourceIp, UserState};
use tracing::debug;

/// Owns every user's tracking state and the logical clock (`latest_timestamp`)
/// used for expiry. Not `Send`/`Sync`-constrained on its own — callers are
/// expected to confine it to a single serialization domain.
#[derive(Debug)]
pub struct Tracker {
    users: HashMap<Email, UserState>,
    latest_timestamp: Option<DateTime<Utc>>,
    concurrent_window_s: i64,
    data_retention_s: i64,
}

impl Tracker {
    #[must_use]
    pub fn new(concurrent_window_s: i64, data_retention_s: i64) -> Self {
        Self {
            users: HashMap::new(),
            latest_timestamp: None,
            concurrent_window_s,
            data_retention_s,
        }
    }

    /// Fold one parsed entry into its user's state, creating the state if
    /// this is the first entry seen for that email. Advances
    /// `latest_timestamp` if the entry is newer than anything seen so far.
    pub fn process_entry(&mut self, entry: &LogEntry, node_name: NodeName) -> &UserState {
        if self.latest_timestamp.is_none_or(|t| entry.timestamp > t) {
            self.latest_timestamp = Some(entry.timestamp);
        }

        self.users
            .entry(entry.email.clone())
            .and_modify(|state| state.record(entry, node_name.clone()))
            .or_insert_with(|| UserState::new(entry, node_name));

        self.users
            .get(&entry.email)
            .expect("entry was just inserted or updated")
    }

    /// Drop users whose last activity predates `latest_timestamp -
    /// DATA_RETENTION`; expires stale IPs on the survivors. Returns the
    /// number of users removed.
    pub fn cleanup_old_data(&mut self) -> usize {
        let Some(latest) = self.latest_timestamp else {
            return 0;
        };

        let before = self.users.len();
        self.users
            .retain(|_, state| (latest - state.last_seen).num_seconds() < self.data_retention_s);

        for state in self.users.values_mut() {
            state.expire_ips(latest, self.concurrent_window_s);
        }

        let removed = before - self.users.len();
        if removed > 0 {
            debug!(removed, "cleaned up stale user state");
        }
        removed
    }

    /// IPs whose concurrent-window activity is shared by two or more
    /// distinct users, used by `/api/shared_ips`.
    #[must_use]
    pub fn shared_ips(&self) -> HashSet<SourceIp> {
        if self.latest_timestamp.is_none() {
            return HashSet::new();
        }

        let mut owners: HashMap<SourceIp, HashSet<&Email>> = HashMap::new();
        for (email, state) in &self.users {
            for ip in state.recent_ips(state.last_seen, self.concurrent_window_s, 1) {
                owners.entry(ip).or_default().insert(email);
            }
        }

        owners
            .into_iter()
            .filter(|(_, emails)| emails.len() >= 2)
            .map(|(ip, _)| ip)
            .collect()
    }

    /// Read-only view over every tracked user, for the query surface.
    #[must_use]
    pub fn snapshot(&self) -> &HashMap<Email, UserState> {
        &self.users
    }

    /// The state for one user, if tracked.
    #[must_use]
    pub fn get(&self, email: &Email) -> Option<&UserState> {
        self.users.get(email)
    }

    /// The logical clock: the max timestamp of any entry processed so far.
    #[must_use]
    pub const fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.latest_timestamp
    }
}
