// ABOUTME: Main library module for the treeline phylogenetics pipeline
// ABOUTME: Exports all core modules and provides the public API

pub mod cli;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod samples;
pub mod stages;
pub mod tools;
pub mod trace;

// Re-export commonly used types
pub use cli::{App, Args, Config};
pub use pipeline::{PipelineResult, PipelineRunner, RunContext, StageResult, StageStatus};
pub use samples::SampleRegistry;
pub use trace::SeqRecord;

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
