// ABOUTME: Error types for pipeline stage execution
// ABOUTME: Wraps tool, trace, and sample errors plus stage-level defects

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Tool error: {0}")]
    ToolError(#[from] crate::tools::ToolError),

    #[error("Trace error: {0}")]
    TraceError(#[from] crate::trace::TraceError),

    #[error("Sample error: {0}")]
    SampleError(#[from] crate::samples::SampleError),

    #[error("Output error: {0}")]
    OutputError(#[from] crate::output::OutputError),

    #[error("No samples are shared across all genes; nothing to concatenate")]
    NoSharedSamples,

    #[error("No conserved sites left in the {gene} alignment; try a more relaxed trimming preset")]
    NoConservedSites { gene: String },

    #[error("No usable sequences remain after quality trimming")]
    NothingSurvivedTrimming,

    #[error("BLAST database '{db}' not usable: {reason}")]
    BlastDbError { db: String, reason: String },

    #[error("Remote lookup disabled but required for {context}")]
    RemoteDisabled { context: String },

    #[error("Remote service error ({service}): {message}")]
    RemoteError { service: String, message: String },

    #[error("RAxML-NG reported errors:\n{}", errors.join("\n"))]
    RaxmlFailed { errors: Vec<String> },

    #[error("Stage precondition missing: {0}")]
    MissingInput(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
