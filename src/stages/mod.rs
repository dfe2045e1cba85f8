// ABOUTME: The pipeline stages, from trace trimming to tree inference
// ABOUTME: Defines the Stage trait all stages implement

pub mod align;
pub mod blast;
pub mod concat;
pub mod gblocks;
pub mod raxml;
pub mod trim;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::pipeline::{PipelineState, Result, RunContext};

/// What a successful stage hands back to the runner: a one-line
/// summary for the log plus key/value details for the run record.
#[derive(Debug, Default)]
pub struct StageOutput {
    pub summary: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl StageOutput {
    pub fn summary(text: impl Into<String>) -> Self {
        Self {
            summary: Some(text.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// A stage can opt out before running (configuration switches).
    fn skip_reason(&self, ctx: &RunContext) -> Option<String> {
        let _ = ctx;
        None
    }

    async fn execute(&self, ctx: &RunContext, state: &mut PipelineState) -> Result<StageOutput>;
}
