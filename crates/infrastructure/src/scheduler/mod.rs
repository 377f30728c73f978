//! Interval-based background task scheduler
//!
//! Drives the periodic work the detection loop needs without blocking it:
//! directory refresh, tracker cleanup, and violator sweeps all run as
//! independent `tokio::task`s on their own fixed interval, reporting
//! success/failure back through a shared stats table. This keeps slow or
//! failing background work off the detection critical path while still
//! giving a single place to observe and shut them all down.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, instrument};

/// Scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Task not found
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A task with this name is already registered
    #[error("Task already registered: {0}")]
    AlreadyRegistered(String),
}

/// Statistics for a scheduled task
#[derive(Debug, Clone)]
pub struct TaskStats {
    /// Task name
    pub name: String,
    /// Fixed run interval
    pub interval: Duration,
    /// Number of successful executions
    pub success_count: u64,
    /// Number of failed executions
    pub failure_count: u64,
    /// Last execution time
    pub last_run: Option<DateTime<Utc>>,
    /// Last error message
    pub last_error: Option<String>,
}

struct TaskMetadata {
    name: String,
    interval: Duration,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    last_run: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    handle: RwLock<Option<JoinHandle<()>>>,
}

impl TaskMetadata {
    fn to_stats(&self) -> TaskStats {
        TaskStats {
            name: self.name.clone(),
            interval: self.interval,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            last_run: *self.last_run.read(),
            last_error: self.last_error.read().clone(),
        }
    }

    fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        *self.last_run.write() = Some(Utc::now());
    }

    fn record_failure(&self, error: String) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        *self.last_run.write() = Some(Utc::now());
        *self.last_error.write() = Some(error);
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Shutdown broadcast channel capacity
    pub shutdown_buffer_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_buffer_size: 8,
        }
    }
}

/// Runs named periodic tasks, each on its own interval, until shut down.
pub struct TaskScheduler {
    tasks: Arc<RwLock<HashMap<String, Arc<TaskMetadata>>>>,
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("task_count", &self.tasks.read().len())
            .finish_non_exhaustive()
    }
}

impl TaskScheduler {
    /// Create a new, empty scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(config.shutdown_buffer_size);
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Register and spawn a task that runs `task()` every `interval`, starting
    /// after the first tick. The task keeps running until `stop` is called or
    /// this scheduler is dropped.
    #[instrument(skip(self, task))]
    pub fn add_task<F, Fut>(
        &self,
        name: &str,
        interval: Duration,
        task: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), String>> + Send + 'static,
    {
        if self.tasks.read().contains_key(name) {
            return Err(SchedulerError::AlreadyRegistered(name.to_string()));
        }

        let metadata = Arc::new(TaskMetadata {
            name: name.to_string(),
            interval,
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            last_run: RwLock::new(None),
            last_error: RwLock::new(None),
            handle: RwLock::new(None),
        });

        let metadata_for_task = Arc::clone(&metadata);
        let task_name = name.to_string();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match task().await {
                            Ok(()) => {
                                metadata_for_task.record_success();
                                debug!(task = %task_name, "periodic task completed");
                            },
                            Err(e) => {
                                metadata_for_task.record_failure(e.clone());
                                error!(task = %task_name, error = %e, "periodic task failed");
                            },
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        info!(task = %task_name, "periodic task shutting down");
                        break;
                    },
                }
            }
        });

        *metadata.handle.write() = Some(handle);
        self.tasks.write().insert(name.to_string(), metadata);
        info!(task = %name, interval_s = interval.as_secs(), "periodic task registered");
        Ok(())
    }

    /// Signal every task to stop and wait for them to finish.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            debug!("scheduler already stopped");
            return;
        }

        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .write()
            .values()
            .filter_map(|m| m.handle.write().take())
            .collect();

        for handle in handles {
            let _ = handle.await;
        }
        info!("scheduler stopped");
    }

    /// Whether the scheduler has not yet been stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get statistics for a specific task.
    #[must_use]
    pub fn get_task_stats(&self, name: &str) -> Option<TaskStats> {
        self.tasks.read().get(name).map(|m| m.to_stats())
    }

    /// Get statistics for all tasks.
    #[must_use]
    pub fn get_all_stats(&self) -> Vec<TaskStats> {
        self.tasks.read().values().map(|m| m.to_stats()).collect()
    }

    /// List all registered task names.
    #[must_use]
    pub fn list_tasks(&self) -> Vec<String> {
        self.tasks.read().keys().cloned().collect()
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }
}
