// ABOUTME: Sequential pipeline runner orchestrating the stages
// ABOUTME: A failed stage aborts the run; remaining stages are recorded skipped

use tracing::{error, info, warn};

use crate::stages::Stage;

use super::context::{PipelineState, RunContext};
use super::result::{PipelineResult, StageResult, StageStatus};

pub struct PipelineRunner {
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineRunner {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The standard trace-to-tree stage line-up.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(crate::stages::trim::TrimStage),
            Box::new(crate::stages::blast::BlastStage),
            Box::new(crate::stages::align::AlignStage),
            Box::new(crate::stages::gblocks::GblocksStage),
            Box::new(crate::stages::concat::ConcatStage),
            Box::new(crate::stages::raxml::RaxmlStage),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Execute all stages in declared order. Always returns a complete
    /// result; failures are recorded, not propagated.
    pub async fn execute(&self, ctx: &RunContext) -> PipelineResult {
        let mut pipeline_result = PipelineResult::new(ctx.run_id.clone(), ctx.seed);
        pipeline_result
            .metadata
            .insert("genes".to_string(), ctx.genes().join(","));
        pipeline_result.metadata.insert(
            "output_dir".to_string(),
            ctx.paths.root().display().to_string(),
        );

        let mut state = PipelineState::default();
        let mut aborted = false;

        info!(
            "starting pipeline run {} with {} stages",
            ctx.run_id,
            self.stages.len()
        );

        for stage in &self.stages {
            let mut result = StageResult::new(stage.name());

            if aborted {
                result.mark_completed(
                    StageStatus::Skipped,
                    None,
                    Some("earlier stage failed".to_string()),
                );
                pipeline_result.add_stage_result(result);
                continue;
            }

            if let Some(reason) = stage.skip_reason(ctx) {
                info!("skipping stage {}: {}", stage.name(), reason);
                result.mark_completed(StageStatus::Skipped, None, Some(reason));
                pipeline_result.add_stage_result(result);
                continue;
            }

            info!("stage {} starting", stage.name());
            result.mark_started();

            match stage.execute(ctx, &mut state).await {
                Ok(output) => {
                    for (key, value) in output.metadata {
                        result.add_metadata(key, value);
                    }
                    if let Some(ref summary) = output.summary {
                        info!("stage {} finished: {}", stage.name(), summary);
                    } else {
                        info!("stage {} finished", stage.name());
                    }
                    result.mark_completed(StageStatus::Success, output.summary, None);
                }
                Err(e) => {
                    error!("stage {} failed: {}", stage.name(), e);
                    result.mark_completed(StageStatus::Failed, None, Some(e.to_string()));
                    aborted = true;
                }
            }
            pipeline_result.add_stage_result(result);
        }

        pipeline_result.mark_completed();
        if pipeline_result.has_failures() {
            warn!(
                "pipeline run {} finished with failures ({}/{} stages succeeded)",
                ctx.run_id,
                pipeline_result.summary.successful_stages,
                pipeline_result.summary.total_stages
            );
        } else {
            info!(
                "pipeline run {} finished in {:.1}s",
                ctx.run_id,
                pipeline_result
                    .duration
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0)
            );
        }
        pipeline_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Config;
    use crate::pipeline::error::PipelineError;
    use crate::stages::StageOutput;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct OkStage(&'static str);
    struct FailStage;
    struct SkipStage;

    #[async_trait]
    impl Stage for OkStage {
        fn name(&self) -> &'static str {
            self.0
        }
        async fn execute(
            &self,
            _ctx: &RunContext,
            _state: &mut PipelineState,
        ) -> crate::pipeline::Result<StageOutput> {
            Ok(StageOutput::summary("done"))
        }
    }

    #[async_trait]
    impl Stage for FailStage {
        fn name(&self) -> &'static str {
            "explode"
        }
        async fn execute(
            &self,
            _ctx: &RunContext,
            _state: &mut PipelineState,
        ) -> crate::pipeline::Result<StageOutput> {
            Err(PipelineError::MissingInput("nothing works".to_string()))
        }
    }

    #[async_trait]
    impl Stage for SkipStage {
        fn name(&self) -> &'static str {
            "optional"
        }
        fn skip_reason(&self, _ctx: &RunContext) -> Option<String> {
            Some("disabled in config".to_string())
        }
        async fn execute(
            &self,
            _ctx: &RunContext,
            _state: &mut PipelineState,
        ) -> crate::pipeline::Result<StageOutput> {
            unreachable!("skipped stages must not execute")
        }
    }

    fn test_context(dir: &TempDir) -> RunContext {
        let mut config = Config::default();
        config.output_dir = dir.path().join("results");
        config.seed = Some(11);
        RunContext::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let runner = PipelineRunner::new(vec![Box::new(OkStage("one")), Box::new(OkStage("two"))]);

        let result = runner.execute(&ctx).await;
        assert_eq!(result.status, crate::pipeline::PipelineStatus::Success);
        assert_eq!(result.summary.successful_stages, 2);
        assert_eq!(result.seed, 11);
    }

    #[tokio::test]
    async fn test_failure_skips_the_rest() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let runner = PipelineRunner::new(vec![
            Box::new(OkStage("one")),
            Box::new(FailStage),
            Box::new(OkStage("late")),
        ]);

        let result = runner.execute(&ctx).await;
        assert_eq!(result.status, crate::pipeline::PipelineStatus::Failed);
        assert_eq!(result.summary.failed_stages, 1);
        assert_eq!(result.summary.skipped_stages, 1);
        let late = result.get_stage("late").unwrap();
        assert_eq!(late.status, StageStatus::Skipped);
        assert_eq!(late.error.as_deref(), Some("earlier stage failed"));
    }

    #[tokio::test]
    async fn test_declared_skip() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let runner = PipelineRunner::new(vec![Box::new(SkipStage), Box::new(OkStage("one"))]);

        let result = runner.execute(&ctx).await;
        assert_eq!(result.status, crate::pipeline::PipelineStatus::Success);
        let skipped = result.get_stage("optional").unwrap();
        assert_eq!(skipped.status, StageStatus::Skipped);
        assert_eq!(skipped.error.as_deref(), Some("disabled in config"));
    }
}
