//! Infrastructure adapters
//!
//! Adapters connect application ports to concrete implementations.

mod circuit_breaker;
mod panel_directory_adapter;
mod telegram_notifier;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitOpenError, CircuitState,
};
pub use panel_directory_adapter::PanelDirectoryAdapter;
pub use telegram_notifier::TelegramNotifier;
