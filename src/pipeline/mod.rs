//! Ingestion cycle: the run-result model and the pipeline that produces it.

mod run_result;
mod runner;

pub use run_result::{
    failure_summary, parse_failure_summary, AppRunResult, RunResult, RunResultBuilder, RunStatus,
};
pub use runner::IngestionPipeline;
