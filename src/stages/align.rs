// ABOUTME: Multiple sequence alignment stage, one MSA per gene
// ABOUTME: Local mafft/clustalo/muscle/t_coffee, EBI job dispatcher fallback

use std::path::Path;

use tracing::{debug, info, warn};

use crate::cli::config::MsaAlgo;
use crate::pipeline::{PipelineError, PipelineState, Result, RunContext};
use crate::tools::{find_binary, ToolCommand};

use super::{Stage, StageOutput};

const EBI_BASE: &str = "https://www.ebi.ac.uk/Tools/services/rest";

pub struct AlignStage;

#[async_trait::async_trait]
impl Stage for AlignStage {
    fn name(&self) -> &'static str {
        "align"
    }

    async fn execute(&self, ctx: &RunContext, state: &mut PipelineState) -> Result<StageOutput> {
        let genes = state.registry()?.genes.clone();
        let algo = ctx.config.msa.algo;

        let binary = ctx
            .config
            .msa
            .binary
            .clone()
            .filter(|p| p.is_file())
            .or_else(|| find_binary(algo.as_str()));

        let mut aligned = 0usize;
        for gene in &genes {
            let fasta = ctx.paths.gene_fasta(gene);
            let raw_msa = ctx.paths.raw_msa(gene);

            match binary {
                Some(ref binary) => {
                    debug!("preparing {} MSA run for {}", algo, gene);
                    self.build_local(ctx, algo, binary, gene, &fasta, &raw_msa)
                        .await?;
                }
                None => {
                    if !ctx.config.remote.enabled {
                        return Err(PipelineError::RemoteDisabled {
                            context: format!("{} is not installed", algo),
                        });
                    }
                    warn!("running {} online for {}", algo, gene);
                    self.build_remote(ctx, algo, gene, &fasta, &raw_msa).await?;
                }
            }
            aligned += 1;
        }

        Ok(StageOutput::summary(format!(
            "{} gene alignment(s) built with {}",
            aligned, algo
        ))
        .with_metadata("algorithm", algo.as_str())
        .with_metadata(
            "mode",
            if binary.is_some() { "local" } else { "remote" },
        ))
    }
}

impl AlignStage {
    /// Build an MSA locally using a pre-installed binary. Argument
    /// shapes follow each aligner's conventions; mafft writes the
    /// alignment to stdout.
    async fn build_local(
        &self,
        ctx: &RunContext,
        algo: MsaAlgo,
        binary: &Path,
        gene: &str,
        fasta: &Path,
        raw_msa: &Path,
    ) -> Result<()> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let log = ctx.paths.tool_log(gene, algo.as_str());
        let command = ToolCommand::new(binary)
            .log_to(&log)
            .timeout_seconds(ctx.config.msa.timeout_seconds);

        let command = match algo {
            MsaAlgo::Mafft => command
                .arg("--thread")
                .arg(threads.to_string())
                .arg("--auto")
                .arg(fasta.display().to_string())
                .stdout_to(raw_msa),
            MsaAlgo::Clustalo => command
                .arg("--in")
                .arg(fasta.display().to_string())
                .arg("--out")
                .arg(raw_msa.display().to_string())
                .arg("--outfmt")
                .arg("fasta")
                .arg("--threads")
                .arg(threads.to_string())
                .arg("--force")
                .arg("--auto"),
            MsaAlgo::Muscle => command
                .arg("-in")
                .arg(fasta.display().to_string())
                .arg("-out")
                .arg(raw_msa.display().to_string()),
            MsaAlgo::TCoffee => command
                .arg("-in")
                .arg(fasta.display().to_string())
                .arg("-out")
                .arg(raw_msa.display().to_string())
                .arg("-output")
                .arg("fasta_aln")
                .arg("-type")
                .arg("dna"),
        };

        let output = command.run().await?;
        info!(
            "{} alignment for {} took {:.2}s",
            algo,
            gene,
            output.elapsed.as_secs_f64()
        );
        Ok(())
    }

    /// Build an MSA through the EBI job dispatcher REST API:
    /// submit the FASTA, poll the job, fetch the aligned result.
    async fn build_remote(
        &self,
        ctx: &RunContext,
        algo: MsaAlgo,
        gene: &str,
        fasta: &Path,
        raw_msa: &Path,
    ) -> Result<()> {
        let client = reqwest::Client::new();
        let sequence = std::fs::read_to_string(fasta)?;
        let tool = algo.ebi_name();

        let mut form = vec![
            ("email", ctx.config.remote.email.clone()),
            ("sequence", sequence),
            ("stype", "dna".to_string()),
        ];
        match algo {
            MsaAlgo::Clustalo => form.push(("outfmt", "fa".to_string())),
            MsaAlgo::Muscle => form.push(("format", "fasta".to_string())),
            MsaAlgo::TCoffee => form.push(("format", "fasta_aln".to_string())),
            MsaAlgo::Mafft => {}
        }

        let job_id = client
            .post(format!("{}/{}/run", EBI_BASE, tool))
            .form(&form)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| remote_error(tool, e))?
            .text()
            .await?
            .trim()
            .to_string();
        info!("EBI {} job {} submitted for {}", tool, job_id, gene);

        let poll = std::time::Duration::from_secs(ctx.config.remote.poll_seconds.max(5));
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_secs(ctx.config.remote.timeout_seconds);
        loop {
            tokio::time::sleep(poll).await;
            if tokio::time::Instant::now() > deadline {
                return Err(PipelineError::RemoteError {
                    service: format!("EBI {}", tool),
                    message: format!("job {} timed out", job_id),
                });
            }

            let status = client
                .get(format!("{}/{}/status/{}", EBI_BASE, tool, job_id))
                .send()
                .await?
                .text()
                .await?;
            match status.trim() {
                "FINISHED" => break,
                "RUNNING" | "PENDING" | "QUEUED" => debug!("job {} still {}", job_id, status.trim()),
                other => {
                    return Err(PipelineError::RemoteError {
                        service: format!("EBI {}", tool),
                        message: format!("job {} ended with status {}", job_id, other),
                    });
                }
            }
        }

        let alignment = client
            .get(format!("{}/{}/result/{}/aln-fasta", EBI_BASE, tool, job_id))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| remote_error(tool, e))?
            .text()
            .await?;

        if let Some(parent) = raw_msa.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(raw_msa, alignment)?;
        Ok(())
    }
}

fn remote_error(tool: &str, e: reqwest::Error) -> PipelineError {
    PipelineError::RemoteError {
        service: format!("EBI {}", tool),
        message: e.to_string(),
    }
}
