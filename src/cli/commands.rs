// ABOUTME: Command implementations wiring configuration into the pipeline
// ABOUTME: run, check, visualize, view, and export entry points

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::export;
use crate::output;
use crate::pipeline::{PipelineRunner, RunContext};
use crate::report;
use crate::samples::naming::NamingRules;
use crate::tools::find_binary;

use super::config::GblocksPreset;
use super::Config;

/// Execute the full pipeline, write the run summary, and (on success)
/// render the report and start the preview server.
pub async fn run_pipeline(config: Config, headless: bool) -> Result<()> {
    let ctx = RunContext::new(config)?;
    let runner = PipelineRunner::standard();

    let result = runner.execute(&ctx).await;
    output::write_result_json(&ctx.paths.result_json(), &result)?;

    if result.has_failures() {
        bail!(
            "pipeline failed; see {} and {}",
            ctx.paths.result_json().display(),
            ctx.paths.log_file().display()
        );
    }

    report::build_report(&ctx.paths, &ctx.config)
        .await
        .context("rendering report")?;
    info!("report written to {}", ctx.paths.report().display());

    if !headless {
        report::serve(ctx.paths.root().to_path_buf(), ctx.config.server.port, true).await?;
    }
    Ok(())
}

/// Dry run: validate inputs and report which external tools resolve.
pub async fn check(config: Config) -> Result<()> {
    let rules = NamingRules::from_config(&config.naming)?;
    let abi_dir = config
        .abi_dir
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("abi_dir is not set; pass --abi-dir"))?;

    let plates = match config.csv_dir.as_deref() {
        Some(dir) => crate::samples::PlateBook::load(dir)?,
        None => crate::samples::PlateBook::empty(),
    };
    let registry = crate::samples::SampleRegistry::discover(
        crate::samples::registry::DiscoveryOptions {
            abi_dir,
            genes: &config.genes,
            rules: &rules,
            plates: &plates,
            abi_whitelist: config.abi_set.as_deref(),
            sample_whitelist: config.sample_set.as_deref(),
        },
    )?;

    info!(
        "{} trace records, {} samples, genes: {}",
        registry.records.len(),
        registry.sample_count(),
        registry.genes.join(", ")
    );

    let mut missing = Vec::new();
    let mut check_tool = |label: &str, configured: Option<&Path>, name: &str| {
        let found = configured
            .map(|p| p.to_path_buf())
            .filter(|p| p.is_file())
            .or_else(|| find_binary(name));
        match found {
            Some(path) => info!("{}: {}", label, path.display()),
            None => {
                warn!("{}: {} not found", label, name);
                missing.push(name.to_string());
            }
        }
    };

    check_tool(
        "aligner",
        config.msa.binary.as_deref(),
        config.msa.algo.as_str(),
    );
    if config.gblocks.preset != GblocksPreset::Skip {
        check_tool("trimming", config.gblocks.binary.as_deref(), "Gblocks");
    }
    check_tool("inference", config.raxml.binary.as_deref(), "raxml-ng");
    if config.blast.enabled {
        check_tool("blast", None, "blastn");
        match config.blast.db_path {
            Some(ref path) => info!("blast database: {} in {}", config.blast.db, path.display()),
            None if config.blast.remote => {
                info!("no local blast database; remote lookups will be used")
            }
            None => warn!("no local blast database and remote lookups disabled"),
        }
    }

    if missing.is_empty() {
        info!("check passed");
        Ok(())
    } else {
        bail!(
            "missing tools: {} (remote fallbacks may still apply)",
            missing.join(", ")
        );
    }
}

/// Rebuild the HTML report from an existing result directory.
pub async fn visualize(dir: &Path, config: &Config) -> Result<()> {
    let paths = crate::pipeline::RunPaths::new(dir);
    report::build_report(&paths, config)
        .await
        .context("rendering report")?;
    info!("report written to {}", paths.report().display());
    Ok(())
}

/// Serve an existing result directory, rendering the report first if
/// it is missing.
pub async fn view(dir: &Path, port: u16, headless: bool, config: &Config) -> Result<()> {
    let paths = crate::pipeline::RunPaths::new(dir);
    if !paths.report().exists() {
        report::build_report(&paths, config)
            .await
            .context("rendering report")?;
    }
    report::serve(dir.to_path_buf(), port, !headless).await?;
    Ok(())
}

/// Write the portable RAxML-NG bundle for an earlier run. The run's
/// seed is reused when the summary is available so reruns compare.
pub async fn export(dir: &Path, binary: Option<&Path>, config: &Config) -> Result<()> {
    let paths = crate::pipeline::RunPaths::new(dir);
    let seed = output::read_result_json(&paths.result_json())
        .map(|result| result.seed)
        .unwrap_or_else(|_| config.seed.unwrap_or(42));
    let archive = export::export_bundle(&paths, &config.raxml, seed, binary)?;
    info!("export bundle written to {}", archive.display());
    Ok(())
}

/// Find the result directory of an earlier run the way the original
/// does: the given path, the configured output dir, and the working
/// directory, each tried directly and under `results/`, accepting the
/// first that holds a support tree or a run summary.
pub fn locate_results(given: Option<&Path>, config: &Config) -> Result<PathBuf> {
    let mut outers: Vec<PathBuf> = Vec::new();
    if let Some(given) = given {
        outers.push(given.to_path_buf());
    }
    outers.push(config.output_dir.clone());
    if let Ok(cwd) = std::env::current_dir() {
        outers.push(cwd);
    }

    for outer in outers {
        for inner in ["", "results"] {
            let candidate = if inner.is_empty() {
                outer.clone()
            } else {
                outer.join(inner)
            };
            let has_run = ["tree_TBE.nwk", "tree_FBP.nwk", "pipeline_result.json"]
                .iter()
                .any(|name| candidate.join(name).is_file());
            if has_run {
                return Ok(candidate);
            }
        }
    }
    bail!("result files not found; pass a result directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_results_prefers_given_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tree_TBE.nwk"), "(a,b);").unwrap();

        let found = locate_results(Some(dir.path()), &Config::default()).unwrap();
        assert_eq!(found, dir.path());
    }

    #[test]
    fn test_locate_results_checks_nested_results_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("results");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("pipeline_result.json"), "{}").unwrap();

        let found = locate_results(Some(dir.path()), &Config::default()).unwrap();
        assert_eq!(found, nested);
    }

    #[test]
    fn test_locate_results_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.output_dir = dir.path().join("nowhere");
        // keep the cwd fallback from accidentally matching
        assert!(locate_results(Some(&dir.path().join("missing")), &config).is_err());
    }
}
