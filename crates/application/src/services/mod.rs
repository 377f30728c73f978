//! Application services - use case implementations

mod detection_engine;
mod engine_actor;
mod tracker;

pub use detection_engine::{DetectionConfig, DetectionEngine};
pub use engine_actor::{EngineActor, EngineHandle, EngineStats, UserDetail, UserSummary, ViolatorSummary};
pub use tracker::Tracker;
