// ABOUTME: Alignment trimming stage using Gblocks
// ABOUTME: Preset parameter computation from per-gene sequence counts

use tracing::{debug, info};

use crate::cli::config::GblocksPreset;
use crate::pipeline::{PipelineError, PipelineState, Result, RunContext};
use crate::tools::{find_binary, ToolCommand};

use super::{Stage, StageOutput};

pub struct GblocksStage;

/// The `-b1/-b2/-b4/-b5` values handed to Gblocks, derived from a
/// preset and the number of sequences in the alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GblocksParams {
    /// -b1: minimum sequences for a conserved position
    pub conserved: usize,
    /// -b2: minimum sequences for a flanking position
    pub flank: usize,
    /// -b4: minimum block length
    pub min_block: usize,
    /// -b5: allowed gap positions (n, h, or a)
    pub gaps: char,
}

impl GblocksParams {
    pub fn for_preset(preset: GblocksPreset, seq_count: usize) -> Self {
        let half_plus = seq_count / 2 + 1;
        match preset {
            GblocksPreset::Relaxed => Self {
                conserved: half_plus,
                flank: half_plus,
                min_block: 5,
                gaps: 'h',
            },
            GblocksPreset::Balanced => Self {
                conserved: half_plus,
                flank: (seq_count / 4 * 3 + 1).min(seq_count),
                min_block: 5,
                gaps: 'h',
            },
            GblocksPreset::Default => Self {
                conserved: half_plus,
                flank: (seq_count * 85 / 100 + 1).min(seq_count),
                min_block: 10,
                gaps: 'n',
            },
            GblocksPreset::Strict | GblocksPreset::Skip => Self {
                conserved: seq_count * 9 / 10,
                flank: seq_count * 9 / 10,
                min_block: 5,
                gaps: 'n',
            },
        }
    }
}

#[async_trait::async_trait]
impl Stage for GblocksStage {
    fn name(&self) -> &'static str {
        "gblocks"
    }

    async fn execute(&self, ctx: &RunContext, state: &mut PipelineState) -> Result<StageOutput> {
        let genes = state.registry()?.genes.clone();
        let preset = ctx.config.gblocks.preset;

        if preset == GblocksPreset::Skip {
            for gene in &genes {
                std::fs::copy(ctx.paths.raw_msa(gene), ctx.paths.trimmed_msa(gene))?;
            }
            info!("skipped Gblocks trimming, only copied files");
            return Ok(
                StageOutput::summary("trimming skipped, raw alignments passed through")
                    .with_metadata("preset", "skip"),
            );
        }

        let binary = ctx
            .config
            .gblocks
            .binary
            .clone()
            .filter(|p| p.is_file())
            .or_else(|| find_binary("Gblocks"))
            .ok_or_else(|| {
                PipelineError::MissingInput("Gblocks binary (install it or use --gblocks skip)".to_string())
            })?;

        for gene in &genes {
            let seq_count = state.seq_counts.get(gene).copied().unwrap_or(0);
            let params = GblocksParams::for_preset(preset, seq_count);
            info!(
                "running {} Gblocks on {} ({} sequences)",
                preset.as_str(),
                gene,
                seq_count
            );
            debug!("{}: {:?}", gene, params);

            let raw_msa = ctx.paths.raw_msa(gene);
            // Gblocks exits non-zero even on success
            ToolCommand::new(&binary)
                .arg(raw_msa.display().to_string())
                .arg("-t=d")
                .arg(format!("-b2={}", params.flank))
                .arg(format!("-b1={}", params.conserved))
                .arg(format!("-b4={}", params.min_block))
                .arg(format!("-b5={}", params.gaps))
                .arg("-e=.txt")
                .arg("-d=n")
                .arg("-s=y")
                .arg("-p=n")
                .log_to(ctx.paths.tool_log(gene, "gblocks"))
                .allow_any_exit()
                .run()
                .await?;

            let trimmed_output = raw_msa.with_file_name(format!(
                "{}.txt",
                raw_msa
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            ));
            if !trimmed_output.is_file() {
                return Err(PipelineError::MissingInput(format!(
                    "Gblocks produced no output for {} (see {})",
                    gene,
                    ctx.paths.tool_log(gene, "gblocks").display()
                )));
            }
            std::fs::rename(&trimmed_output, ctx.paths.trimmed_msa(gene))?;
        }

        Ok(StageOutput::summary(format!(
            "{} alignment(s) trimmed with the {} preset",
            genes.len(),
            preset.as_str()
        ))
        .with_metadata("preset", preset.as_str()))
    }
}
