//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure layer implement these ports.

mod ban_sink_port;
mod limit_directory_port;
mod notifier_port;

pub use ban_sink_port::BanSinkPort;
#[cfg(test)]
pub use ban_sink_port::MockBanSinkPort;
pub use limit_directory_port::LimitDirectoryPort;
#[cfg(test)]
pub use limit_directory_port::MockLimitDirectoryPort;
#[cfg(test)]
pub use notifier_port::MockNotifierPort;
pub use notifier_port::{NotifierPort, NullNotifier};
