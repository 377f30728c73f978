//! Detection Engine - the over-limit escalation state machine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::{DetectionState, Email, LogEntry, NewBanRecord, NodeName, SourceIp};
use tracing::{info, warn};

use crate::error::ApplicationError;
use crate::ports::{BanSinkPort, LimitDirectoryPort, NotifierPort};
use crate::services::tracker::Tracker;

/// How far back an existing ban is still considered "active".
const ACTIVE_BAN_LOOKBACK_HOURS: i64 = 24;

/// All tunable knobs for the escalation state machine.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub concurrent_window_s: i64,
    pub trigger_period_s: i64,
    pub trigger_count: u32,
    pub banlist_threshold_s: i64,
    pub subnet_grouping: bool,
    pub whitelist_emails: HashSet<Email>,
    pub notification_interval_s: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            concurrent_window_s: 2,
            trigger_period_s: 30,
            trigger_count: 5,
            banlist_threshold_s: 300,
            subnet_grouping: false,
            whitelist_emails: HashSet::new(),
            notification_interval_s: 300,
        }
    }
}

/// Owns the per-user escalation state and drives both the per-entry and
/// periodic evaluation paths.
pub struct DetectionEngine {
    config: DetectionConfig,
    states: HashMap<Email, DetectionState>,
    directory: Arc<dyn LimitDirectoryPort>,
    sink: Arc<dyn BanSinkPort>,
    notifier: Arc<dyn NotifierPort>,
}

impl DetectionEngine {
    #[must_use]
    pub fn new(
        config: DetectionConfig,
        directory: Arc<dyn LimitDirectoryPort>,
        sink: Arc<dyn BanSinkPort>,
        notifier: Arc<dyn NotifierPort>,
    ) -> Self {
        Self {
            config,
            states: HashMap::new(),
            directory,
            sink,
            notifier,
        }
    }

    /// The effective over-limit count for `email` at `now`: distinct /24s
    /// under subnet grouping, distinct IPs otherwise.
    fn effective_count(&self, tracker: &Tracker, email: &Email, now: DateTime<Utc>) -> usize {
        let Some(user) = tracker.get(email) else {
            return 0;
        };
        if self.config.subnet_grouping {
            user.recent_ips_by_subnet(now, self.config.concurrent_window_s).len()
        } else {
            user.recent_ips(now, self.config.concurrent_window_s, 1).len()
        }
    }

    /// Per-entry evaluation, invoked after every successful
    /// `Tracker::process_entry` using the entry's own timestamp as "now".
    pub async fn evaluate_entry(&mut self, tracker: &Tracker, entry: &LogEntry) -> Result<(), ApplicationError> {
        if self.config.whitelist_emails.contains(&entry.email) {
            return Ok(());
        }

        let Some(limit_entry) = self.directory.get(&entry.email).await else {
            return Ok(());
        };
        if limit_entry.device_limit == 0 {
            return Ok(());
        }

        let count = self.effective_count(tracker, &entry.email, entry.timestamp);
        if count as u32 <= limit_entry.device_limit {
            return Ok(());
        }

        let t = entry.timestamp;
        let trigger_period_s = self.config.trigger_period_s;
        let trigger_count = self.config.trigger_count;
        let state = self.states.entry(entry.email.clone()).or_default();
        state.push_trigger(t, trigger_period_s);

        if state.triggers.len() as u32 >= trigger_count && !state.is_violator {
            state.enter_violator(t);
            metrics::counter!("banhammer_triggers_fired_total").increment(1);
            info!(email = %entry.email, "user entered violator state");
        }

        if state.is_violator {
            if let Some(user) = tracker.get(&entry.email) {
                let ips = user.recent_ips(t, self.config.concurrent_window_s, 1);
                state.violator_ips.extend(ips);
            }
        }

        Ok(())
    }

    /// Periodic sweep over every email with detection state, invoked on a
    /// wall-clock timer independent of ingestion. Trigger pruning here uses
    /// the sweep's wall-clock time rather than any single user's last-seen,
    /// since the sweep is meant to demote users whose traffic has gone
    /// quiet relative to real time, not relative to their own history.
    pub async fn periodic_sweep(&mut self, tracker: &Tracker, now: DateTime<Utc>) -> Result<(), ApplicationError> {
        let emails: Vec<Email> = self.states.keys().cloned().collect();
        let mut to_remove = Vec::new();

        for email in emails {
            let needs_ban = {
                let state = self
                    .states
                    .get_mut(&email)
                    .expect("email came from states.keys()");
                state.prune_triggers(now, self.config.trigger_period_s);

                if state.is_violator && (state.triggers.len() as u32) < self.config.trigger_count {
                    state.demote();
                    info!(%email, "demoted from violator state");
                }

                state.is_violator
                    && state
                        .violator_first_seen
                        .is_some_and(|first_seen| (now - first_seen).num_seconds() >= self.config.banlist_threshold_s)
            };

            if needs_ban {
                self.escalate_ban(tracker, &email, now).await?;
            }

            if self.states.get(&email).is_some_and(DetectionState::is_empty) {
                to_remove.push(email);
            }
        }

        for email in to_remove {
            self.states.remove(&email);
        }
        Ok(())
    }

    async fn escalate_ban(&mut self, tracker: &Tracker, email: &Email, now: DateTime<Utc>) -> Result<(), ApplicationError> {
        let Some(user) = tracker.get(email) else {
            return Ok(());
        };

        let telegram_id = self.directory.get(email).await.and_then(|entry| entry.telegram_id);

        let mut ips: HashSet<SourceIp> = self
            .states
            .get(email)
            .map(|s| s.violator_ips.clone())
            .unwrap_or_default();
        ips.extend(user.recent_ips(user.last_seen, self.config.concurrent_window_s, 1));
        let ip_list: Vec<SourceIp> = ips.into_iter().collect();

        let nodes: Vec<NodeName> = user
            .recent_requests
            .iter()
            .map(|r| r.node_name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let violation_duration_s = self
            .states
            .get(email)
            .and_then(|s| s.violator_first_seen)
            .map_or(0, |first_seen| (now - first_seen).num_seconds());

        let existing = self
            .sink
            .active_ban(email, ACTIVE_BAN_LOOKBACK_HOURS * 3600)
            .await
            .unwrap_or_else(|e| {
                warn!(%email, error = %e, "ban sink lookup failed, treating as no active ban");
                None
            });

        match existing {
            Some(record) => {
                if let Err(e) = self
                    .sink
                    .update(record.id, ip_list.len() as u32, ip_list.clone(), nodes.clone(), violation_duration_s)
                    .await
                {
                    warn!(%email, error = %e, "ban sink update failed");
                }
                info!(%email, ip_count = ip_list.len(), violation_duration_s, "ban list entry updated");

                let should_notify = self
                    .states
                    .get(email)
                    .and_then(|s| s.last_notification_at)
                    .is_none_or(|last| (now - last).num_seconds() >= self.config.notification_interval_s);

                if should_notify {
                    let updated = domain::BanRecord {
                        id: record.id,
                        email: email.clone(),
                        telegram_id,
                        ip_count: ip_list.len() as u32,
                        ips: ip_list,
                        nodes,
                        violation_duration_s,
                        detected_at: record.detected_at,
                        updated_at: now,
                    };
                    match self.notifier.notify_continues(&updated).await {
                        Ok(()) => {
                            if let Some(state) = self.states.get_mut(email) {
                                state.last_notification_at = Some(now);
                            }
                        }
                        Err(e) => warn!(%email, error = %e, "continues notification failed"),
                    }
                }
            }
            None => {
                let new_record = NewBanRecord {
                    email: email.clone(),
                    telegram_id,
                    ip_count: ip_list.len() as u32,
                    ips: ip_list,
                    nodes,
                    violation_duration_s,
                    detected_at: now,
                };
                match self.sink.create(new_record).await {
                    Ok(created) => {
                        metrics::counter!("banhammer_bans_created_total").increment(1);
                        warn!(%email, ip_count = created.ip_count, "new ban list entry created");
                        match self.notifier.notify_new_violation(&created).await {
                            Ok(()) => {
                                if let Some(state) = self.states.get_mut(email) {
                                    state.last_notification_at = Some(now);
                                }
                            }
                            Err(e) => warn!(%email, error = %e, "new-violation notification failed"),
                        }
                    }
                    Err(e) => warn!(%email, error = %e, "ban sink create failed"),
                }
            }
        }

        if let Some(state) = self.states.get_mut(email) {
            state.is_banned = true;
        }
        Ok(())
    }

    /// Read-only view of current detection state, for the query surface.
    #[must_use]
    pub fn snapshot(&self) -> &HashMap<Email, DetectionState> {
        &self.states
    }

    /// Reset `is_banned` on every tracked user after the ban sink has been
    /// cleared. `is_banned` mirrors the sink, so clearing the sink is the
    /// only event that's allowed to flip it back to false.
    pub fn clear_all_bans(&mut self) {
        for state in self.states.values_mut() {
            state.clear_ban();
        }
    }

    /// The configured thresholds, for the stats endpoint.
    #[must_use]
    pub const fn config(&self) -> &DetectionConfig {
        &self.config
    }
}
