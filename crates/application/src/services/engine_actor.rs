//! Single-writer actor owning the Tracker and Detection Engine state.
//!
//! The ingress server accepts many concurrent agent connections, but all
//! mutations to user/detection state must serialize. Rather than guard a
//! shared mutex, one dedicated task owns both the `Tracker` and the
//! `DetectionEngine`; every other component talks to it through a cloneable
//! `EngineHandle` that sends commands over a bounded channel and awaits the
//! reply on a one-shot.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use domain::{Email, IpStats, LogEntry, NodeName, RequestRecord, SourceIp};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, instrument};

use crate::ports::LimitDirectoryPort;
use crate::services::detection_engine::DetectionEngine;
use crate::services::tracker::Tracker;
use std::sync::Arc;

/// Per-user row for the `/api/users` listing.
#[derive(Debug, Clone)]
pub struct UserSummary {
    pub email: Email,
    pub ip_count: usize,
    pub device_limit: Option<u32>,
    pub is_violator: bool,
    pub is_banned: bool,
    pub request_count: u64,
    pub blocked_count: u64,
    pub last_seen: DateTime<Utc>,
}

/// Active-violator row for the `/api/violators` listing.
#[derive(Debug, Clone)]
pub struct ViolatorSummary {
    pub email: Email,
    pub ip_count: usize,
    pub elapsed_s: i64,
    pub remaining_to_ban_s: i64,
}

/// Full detail for the `/api/user/{email}` endpoint.
#[derive(Debug, Clone)]
pub struct UserDetail {
    pub email: Email,
    pub device_limit: Option<u32>,
    pub ip_stats: Vec<(SourceIp, IpStats)>,
    pub recent_requests: Vec<RequestRecord>,
    pub request_count: u64,
    pub blocked_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_violator: bool,
    pub is_banned: bool,
}

/// Global counters and configured thresholds for `/api/stats`.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub total_users: usize,
    pub total_requests: u64,
    pub total_blocked: u64,
    pub violator_count: usize,
    pub banned_count: usize,
    pub concurrent_window_s: i64,
    pub trigger_period_s: i64,
    pub trigger_count: u32,
    pub banlist_threshold_s: i64,
    pub subnet_grouping: bool,
}

enum Command {
    Ingest(Box<LogEntry>, NodeName),
    Sweep(DateTime<Utc>),
    Cleanup,
    Stats(oneshot::Sender<EngineStats>),
    Users(oneshot::Sender<Vec<UserSummary>>),
    Violators(oneshot::Sender<Vec<ViolatorSummary>>),
    UserDetail(Email, oneshot::Sender<Option<Box<UserDetail>>>),
    SharedIps(oneshot::Sender<Vec<SourceIp>>),
    BanlistCleared,
}

/// The dedicated consumer task. Owns the only mutable references to
/// `Tracker` and `DetectionEngine`.
pub struct EngineActor {
    tracker: Tracker,
    engine: DetectionEngine,
    directory: Arc<dyn LimitDirectoryPort>,
    rx: mpsc::Receiver<Command>,
}

impl EngineActor {
    /// Build the actor and its handle. `buffer` bounds the inbound command
    /// channel, providing natural backpressure on ingestion.
    #[must_use]
    pub fn spawn(
        tracker: Tracker,
        engine: DetectionEngine,
        directory: Arc<dyn LimitDirectoryPort>,
        buffer: usize,
    ) -> EngineHandle {
        let (tx, rx) = mpsc::channel(buffer);
        let actor = Self {
            tracker,
            engine,
            directory,
            rx,
        };
        tokio::spawn(actor.run());
        EngineHandle { tx }
    }

    #[instrument(skip_all, name = "engine_actor")]
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Ingest(entry, node_name) => {
                metrics::counter!("banhammer_entries_ingested_total").increment(1);
                self.tracker.process_entry(&entry, node_name);
                if let Err(e) = self.engine.evaluate_entry(&self.tracker, &entry).await {
                    error!(error = %e, "detection evaluation failed");
                }
            }
            Command::Sweep(now) => {
                if let Err(e) = self.engine.periodic_sweep(&self.tracker, now).await {
                    error!(error = %e, "periodic sweep failed");
                }
            }
            Command::Cleanup => {
                self.tracker.cleanup_old_data();
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Users(reply) => {
                let _ = reply.send(self.users().await);
            }
            Command::Violators(reply) => {
                let _ = reply.send(self.violators());
            }
            Command::UserDetail(email, reply) => {
                let _ = reply.send(self.user_detail(&email).await.map(Box::new));
            }
            Command::SharedIps(reply) => {
                let _ = reply.send(self.tracker.shared_ips().into_iter().collect());
            }
            Command::BanlistCleared => {
                self.engine.clear_all_bans();
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.tracker.latest_timestamp().unwrap_or_else(Utc::now)
    }

    fn stats(&self) -> EngineStats {
        let config = self.engine.config();
        let snapshot = self.tracker.snapshot();
        let detection = self.engine.snapshot();
        let violator_count = detection.values().filter(|s| s.is_violator).count();
        let banned_count = detection.values().filter(|s| s.is_banned).count();

        metrics::gauge!("banhammer_violators_active").set(violator_count as f64);
        metrics::gauge!("banhammer_users_tracked").set(snapshot.len() as f64);

        EngineStats {
            total_users: snapshot.len(),
            total_requests: snapshot.values().map(|u| u.request_count).sum(),
            total_blocked: snapshot.values().map(|u| u.blocked_count).sum(),
            violator_count,
            banned_count,
            concurrent_window_s: config.concurrent_window_s,
            trigger_period_s: config.trigger_period_s,
            trigger_count: config.trigger_count,
            banlist_threshold_s: config.banlist_threshold_s,
            subnet_grouping: config.subnet_grouping,
        }
    }

    async fn users(&self) -> Vec<UserSummary> {
        let window = self.engine.config().concurrent_window_s;
        let mut rows = Vec::new();
        for (email, user) in self.tracker.snapshot() {
            let limit = self.directory.get(email).await.map(|l| l.device_limit);
            let detection = self.engine.snapshot().get(email);
            rows.push(UserSummary {
                email: email.clone(),
                ip_count: user.recent_ips(user.last_seen, window, 1).len(),
                device_limit: limit,
                is_violator: detection.is_some_and(|s| s.is_violator),
                is_banned: detection.is_some_and(|s| s.is_banned),
                request_count: user.request_count,
                blocked_count: user.blocked_count,
                last_seen: user.last_seen,
            });
        }
        rows.sort_by(|a, b| b.ip_count.cmp(&a.ip_count));
        rows
    }

    fn violators(&self) -> Vec<ViolatorSummary> {
        let now = self.now();
        let window = self.engine.config().concurrent_window_s;
        let threshold = self.engine.config().banlist_threshold_s;

        self.engine
            .snapshot()
            .iter()
            .filter(|(_, state)| state.is_violator)
            .filter_map(|(email, state)| {
                let first_seen = state.violator_first_seen?;
                let elapsed_s = (now - first_seen).num_seconds();
                let ip_count = self
                    .tracker
                    .get(email)
                    .map_or(0, |u| u.recent_ips(u.last_seen, window, 1).len());
                Some(ViolatorSummary {
                    email: email.clone(),
                    ip_count,
                    elapsed_s,
                    remaining_to_ban_s: (threshold - elapsed_s).max(0),
                })
            })
            .collect()
    }

    async fn user_detail(&self, email: &Email) -> Option<UserDetail> {
        let user = self.tracker.get(email)?;
        let limit = self.directory.get(email).await.map(|l| l.device_limit);
        let detection = self.engine.snapshot().get(email);
        Some(UserDetail {
            email: email.clone(),
            device_limit: limit,
            ip_stats: user.ip_stats.iter().map(|(ip, stats)| (*ip, *stats)).collect(),
            recent_requests: user.recent_requests.iter().cloned().collect(),
            request_count: user.request_count,
            blocked_count: user.blocked_count,
            first_seen: user.first_seen,
            last_seen: user.last_seen,
            is_violator: detection.is_some_and(|s| s.is_violator),
            is_banned: detection.is_some_and(|s| s.is_banned),
        })
    }
}

/// Cheap, cloneable front for submitting work to an `EngineActor`.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

impl EngineHandle {
    /// Submit one parsed entry for processing. Fire-and-forget: detection
    /// failures are logged inside the actor, never surfaced to the caller.
    pub async fn ingest(&self, entry: LogEntry, node_name: NodeName) {
        let _ = self.tx.send(Command::Ingest(Box::new(entry), node_name)).await;
    }

    /// Trigger one periodic sweep using wall-clock `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let _ = self.tx.send(Command::Sweep(now)).await;
    }

    /// Trigger one `DATA_RETENTION`-based cleanup pass.
    pub async fn cleanup(&self) {
        let _ = self.tx.send(Command::Cleanup).await;
    }

    /// Global counters and configured thresholds.
    pub async fn stats(&self) -> Option<EngineStats> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Command::Stats(tx)).await.ok()?;
        rx.await.ok()
    }

    /// Per-user summaries, sorted by current IP count descending.
    pub async fn users(&self) -> Vec<UserSummary> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Users(tx)).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Active violators with elapsed and remaining-to-ban times.
    pub async fn violators(&self) -> Vec<ViolatorSummary> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Violators(tx)).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Full detail for one user, or `None` if unknown.
    pub async fn user_detail(&self, email: &Email) -> Option<UserDetail> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Command::UserDetail(email.clone(), tx)).await.ok()?;
        rx.await.ok().flatten().map(|b| *b)
    }

    /// IPs seen for two or more distinct users within the concurrency window.
    pub async fn shared_ips(&self) -> HashSet<SourceIp> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::SharedIps(tx)).await.is_err() {
            return HashSet::new();
        }
        rx.await.unwrap_or_default().into_iter().collect()
    }

    /// Reconcile detection state with a ban-sink clear: every user's
    /// `is_banned` flag goes back to false. Call this only after the sink
    /// clear itself has succeeded.
    pub async fn notify_banlist_cleared(&self) {
        let _ = self.tx.send(Command::BanlistCleared).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MockBanSinkPort, MockLimitDirectoryPort, MockNotifierPort};
    use crate::services::detection_engine::DetectionConfig;
    use domain::{Protocol, UserLimitEntry};
    use std::net::Ipv4Addr;

    fn entry(email: &str, ip: [u8; 4], ts: DateTime<Utc>) -> LogEntry {
        LogEntry {
            timestamp: ts,
            source_ip: SourceIp::new(Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3])),
            protocol: Protocol::Tcp,
            destination: "example.com".to_string(),
            destination_port: 443,
            action: "DIRECT".to_string(),
            email: Email::new(email).unwrap(),
        }
    }

    #[tokio::test]
    async fn handle_reports_stats_and_user_list() {
        let directory = Arc::new(MockLimitDirectoryPort::new());
        directory.insert(UserLimitEntry::new(Email::new("a@x").unwrap(), 2));
        let sink = Arc::new(MockBanSinkPort::new());
        let notifier = Arc::new(MockNotifierPort::new());

        let tracker = Tracker::new(2, 300);
        let engine = DetectionEngine::new(DetectionConfig::default(), directory.clone(), sink, notifier);
        let handle = EngineActor::spawn(tracker, engine, directory, 16);

        let node = NodeName::new("fra-01").unwrap();
        let t0 = Utc::now();
        handle.ingest(entry("a@x", [1, 1, 1, 1], t0), node).await;

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.total_requests, 1);

        let users = handle.users().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].device_limit, Some(2));
    }

    #[tokio::test]
    async fn notify_banlist_cleared_resets_is_banned_for_all_users() {
        use chrono::Duration;

        let directory = Arc::new(MockLimitDirectoryPort::new());
        directory.insert(UserLimitEntry::new(Email::new("a@x").unwrap(), 2));
        let sink = Arc::new(MockBanSinkPort::new());
        let notifier = Arc::new(MockNotifierPort::new());

        let mut tracker = Tracker::new(2, 300);
        let mut engine = DetectionEngine::new(DetectionConfig::default(), directory.clone(), sink, notifier);
        let node = NodeName::new("fra-01").unwrap();
        let t0 = Utc::now();

        for burst in 0..70 {
            let base = t0 + Duration::seconds(burst * 5);
            for (j, ip) in [[1, 1, 1, 1], [2, 2, 2, 2], [3, 3, 3, 3]].into_iter().enumerate() {
                let e = entry("a@x", ip, base + Duration::milliseconds(j as i64 * 200));
                tracker.process_entry(&e, node.clone());
                engine.evaluate_entry(&tracker, &e).await.unwrap();
            }
            engine.periodic_sweep(&tracker, base).await.unwrap();
        }

        let email = Email::new("a@x").unwrap();
        assert!(engine.snapshot().get(&email).unwrap().is_banned);

        let handle = EngineActor::spawn(tracker, engine, directory, 16);
        let users = handle.users().await;
        assert!(users[0].is_banned);

        handle.notify_banlist_cleared().await;
        let users = handle.users().await;
        assert!(!users[0].is_banned);
    }

    #[tokio::test]
    async fn user_detail_returns_none_for_unknown_email() {
        let directory = Arc::new(MockLimitDirectoryPort::new());
        let sink = Arc::new(MockBanSinkPort::new());
        let notifier = Arc::new(MockNotifierPort::new());
        let tracker = Tracker::new(2, 300);
        let engine = DetectionEngine::new(DetectionConfig::default(), directory.clone(), sink, notifier);
        let handle = EngineActor::spawn(tracker, engine, directory, 16);

        let detail = handle.user_detail(&Email::new("missing@x").unwrap()).await;
        assert!(detail.is_none());
    }
}
