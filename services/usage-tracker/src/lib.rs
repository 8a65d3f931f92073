pub mod api;
pub mod config;
pub mod storage;
pub mod tracker;

pub use api::{create_router, ApiState};
pub use config::UsageTrackerConfig;
pub use storage::{StorageError, UsageDatabase};
pub use tracker::InputGate;
