pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod reporter;
pub mod scheduler;
pub mod storage;
pub mod types;

// Adapters for the external review source
pub mod infra;

pub use error::{IngestError, Result};
