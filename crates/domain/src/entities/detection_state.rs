//! Per-user escalation state for the over-limit detector.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::SourceIp;

/// Escalation bookkeeping for one user identity.
///
/// A user accumulates `triggers` while briefly over their device limit;
/// enough triggers inside `TRIGGER_PERIOD` promotes them to violator. Staying
/// a violator for `BANLIST_THRESHOLD` escalates further to a persisted ban.
/// Nothing here is cleared on ban — only demotion out of violator status
/// clears `violator_first_seen`/`violator_ips`. `is_banned` mirrors the ban
/// sink rather than this state machine: it only goes false when the sink
/// record is cleared, never as a side effect of demotion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionState {
    pub triggers: VecDeque<DateTime<Utc>>,
    pub is_violator: bool,
    pub violator_first_seen: Option<DateTime<Utc>>,
    pub violator_ips: HashSet<SourceIp>,
    pub is_banned: bool,
    pub last_notification_at: Option<DateTime<Utc>>,
}

impl DetectionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new over-limit trigger at `t`, dropping triggers older than
    /// `TRIGGER_PERIOD`.
    pub fn push_trigger(&mut self, t: DateTime<Utc>, trigger_period_s: i64) {
        self.triggers.push_back(t);
        self.prune_triggers(t, trigger_period_s);
    }

    /// Drop triggers older than `cutoff − trigger_period_s`.
    pub fn prune_triggers(&mut self, cutoff: DateTime<Utc>, trigger_period_s: i64) {
        while let Some(&front) = self.triggers.front() {
            if (cutoff - front).num_seconds() > trigger_period_s {
                self.triggers.pop_front();
            } else {
                break;
            }
        }
    }

    /// Promote into violator status at `t`, resetting violator sub-state.
    pub fn enter_violator(&mut self, t: DateTime<Utc>) {
        self.is_violator = true;
        self.violator_first_seen = Some(t);
        self.violator_ips.clear();
    }

    /// Clear violator sub-state on demotion. Leaves `is_banned` untouched —
    /// a banned user who stops triggering is still banned until the sink
    /// record is cleared.
    pub fn demote(&mut self) {
        self.is_violator = false;
        self.violator_first_seen = None;
        self.violator_ips.clear();
    }

    /// Reset the sink-mirrored ban flag, e.g. after the ban list is cleared.
    pub fn clear_ban(&mut self) {
        self.is_banned = false;
    }

    /// Whether the triggers list is empty and this entry can be pruned from
    /// the triggers table entirely.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty() && !self.is_violator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn prune_triggers_drops_entries_outside_period() {
        let mut state = DetectionState::new();
        let t0 = Utc::now();
        state.push_trigger(t0, 30);
        state.push_trigger(t0 + Duration::seconds(10), 30);
        state.push_trigger(t0 + Duration::seconds(40), 30);
        assert_eq!(state.triggers.len(), 2);
    }

    #[test]
    fn demote_clears_violator_substate_but_not_triggers_or_ban() {
        let mut state = DetectionState::new();
        let t0 = Utc::now();
        state.push_trigger(t0, 30);
        state.enter_violator(t0);
        state.is_banned = true;

        state.demote();
        assert!(!state.is_violator);
        assert!(state.violator_first_seen.is_none());
        assert!(state.violator_ips.is_empty());
        assert!(state.is_banned);
        assert_eq!(state.triggers.len(), 1);
    }

    #[test]
    fn clear_ban_resets_the_sink_mirrored_flag() {
        let mut state = DetectionState::new();
        state.is_banned = true;
        state.clear_ban();
        assert!(!state.is_banned);
    }

    #[test]
    fn is_empty_true_only_without_triggers_or_violator_status() {
        let mut state = DetectionState::new();
        assert!(state.is_empty());
        state.push_trigger(Utc::now(), 30);
        assert!(!state.is_empty());
    }
}
