// ABOUTME: Pipeline engine: run context, stage results, and the sequential runner
// ABOUTME: Coordinates the file-based hand-off from traces to the final tree

pub mod context;
pub mod error;
pub mod result;
pub mod runner;

pub use context::{PipelineState, RunContext, RunPaths};
pub use error::{PipelineError, Result};
pub use result::{PipelineResult, PipelineStatus, PipelineSummary, StageResult, StageStatus};
pub use runner::PipelineRunner;
