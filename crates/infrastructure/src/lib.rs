#![forbid(unsafe_code)]
//! Infrastructure layer - Adapters for external systems
//!
//! Implements ports defined in the `application` layer: the panel user-limit
//! directory, the Telegram notifier, SQLite-backed ban storage, configuration
//! loading, telemetry, and the periodic task scheduler.

pub mod adapters;
pub mod config;
pub mod persistence;
pub mod retry;
pub mod scheduler;
pub mod telemetry;

pub use adapters::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitOpenError, CircuitState,
    PanelDirectoryAdapter, TelegramNotifier,
};
pub use config::{
    ApiConfig, AppConfig, DatabaseConfig, DetectionAppConfig, PanelConfig, RetryAppConfig,
    TcpConfig, TelemetryAppConfig,
};
pub use persistence::{ConnectionPool, DatabaseError, SqliteBanSink, create_pool};
pub use retry::{RetryConfig, RetryResult, Retryable, retry, with_retry};
pub use scheduler::{SchedulerConfig, SchedulerError, TaskScheduler, TaskStats};
pub use telemetry::{TelemetryConfig as OtelConfig, TelemetryGuard, init_telemetry};
