// ABOUTME: Error types for report generation and serving
// ABOUTME: Covers newick parsing, template rendering, and the preview server

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Invalid newick at byte {position}: {message}")]
    NewickError { position: usize, message: String },

    #[error("No support tree found in {dir} (expected tree_TBE.nwk or tree_FBP.nwk)")]
    NoTree { dir: PathBuf },

    #[error("Template error: {0}")]
    TemplateError(#[from] handlebars::RenderError),

    #[error("Template registration error: {0}")]
    RegistrationError(#[from] handlebars::TemplateError),

    #[error("Output error: {0}")]
    OutputError(#[from] crate::output::OutputError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
