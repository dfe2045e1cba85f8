// ABOUTME: External tool invocation layer for the pipeline
// ABOUTME: Provides PATH discovery and logged subprocess execution

pub mod error;
pub mod process;

pub use error::{Result, ToolError};
pub use process::{find_binary, ToolCommand, ToolOutput};
