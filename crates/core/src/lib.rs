//! Core utilities shared by every Baldwin crate.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Engine configuration
//! - Ordered teardown of GPU resources ([`DeletionQueue`])
//! - Frame timer

mod config;
mod deletion_queue;
mod error;
mod logging;
mod timer;

pub use config::{EngineConfig, RenderApi};
pub use deletion_queue::{DeletionQueue, Deleter};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
