// ABOUTME: Run summary serialization
// ABOUTME: Writes pipeline_result.json after every run, successful or not

use std::path::Path;

use tracing::info;

use crate::pipeline::PipelineResult;

use super::error::{OutputError, Result};

pub fn write_result_json(path: &Path, result: &PipelineResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json).map_err(|source| OutputError::WriteError {
        path: path.to_path_buf(),
        source,
    })?;
    info!("run summary written to {}", path.display());
    Ok(())
}

pub fn read_result_json(path: &Path) -> Result<PipelineResult> {
    let content = std::fs::read_to_string(path).map_err(|source| OutputError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
