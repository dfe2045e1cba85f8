// ABOUTME: Error types for external tool discovery and execution
// ABOUTME: Non-zero exits carry the tool log path for diagnosis

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Binary not found on PATH: {name}")]
    NotFound { name: String },

    #[error("{program} exited with status {code}{}", log_hint(.log))]
    ExitStatus {
        program: String,
        code: i32,
        log: Option<PathBuf>,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("{program} was terminated by a signal")]
    Terminated { program: String },

    #[error("IO error running {program}: {source}")]
    IoError {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn log_hint(log: &Option<PathBuf>) -> String {
    match log {
        Some(path) => format!(" (see {})", path.display()),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;
