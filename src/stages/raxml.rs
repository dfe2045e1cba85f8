// ABOUTME: Maximum-likelihood tree inference stage via RAxML-NG
// ABOUTME: Check, ML search, bootstrapping, and branch support, with progress parsing

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::pipeline::{PipelineError, PipelineState, Result, RunContext};
use crate::tools::{find_binary, ToolCommand};

use super::{Stage, StageOutput};

pub struct RaxmlStage;

/// Follows RAxML-NG stdout and counts the tree-progress motifs.
#[derive(Default)]
pub struct RaxmlProgress {
    ml_trees: AtomicUsize,
    bootstrap_trees: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl RaxmlProgress {
    pub fn observe(&self, line: &str) {
        if line.contains("ML tree search #") {
            self.ml_trees.fetch_add(1, Ordering::Relaxed);
        } else if line.contains("Bootstrap tree #") {
            self.bootstrap_trees.fetch_add(1, Ordering::Relaxed);
        } else if line.starts_with("ERROR") {
            if let Ok(mut errors) = self.errors.lock() {
                errors.push(line.to_string());
            }
        }
        if line.starts_with("Elapsed time") {
            debug!("raxml-ng: {}", line);
        }
    }

    pub fn ml_trees(&self) -> usize {
        self.ml_trees.load(Ordering::Relaxed)
    }

    pub fn bootstrap_trees(&self) -> usize {
        self.bootstrap_trees.load(Ordering::Relaxed)
    }

    pub fn take_errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .map(|mut errors| std::mem::take(&mut *errors))
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Stage for RaxmlStage {
    fn name(&self) -> &'static str {
        "raxml"
    }

    async fn execute(&self, ctx: &RunContext, _state: &mut PipelineState) -> Result<StageOutput> {
        let msa = ctx.paths.msa();
        if !msa.is_file() {
            return Err(PipelineError::MissingInput(format!(
                "{} (produced by the concat stage)",
                msa.display()
            )));
        }

        let binary = ctx
            .config
            .raxml
            .binary
            .clone()
            .filter(|p| p.is_file())
            .or_else(|| find_binary("raxml-ng"))
            .ok_or_else(|| PipelineError::MissingInput("raxml-ng binary".to_string()))?;

        std::fs::create_dir_all(ctx.paths.raxml_dir())?;
        let progress = RaxmlProgress::default();

        for (description, step, args) in build_calls(ctx, &msa) {
            info!("{}", description);
            let result = ToolCommand::new(&binary)
                .args(args)
                .log_to(ctx.paths.raxml_log(step))
                .run_streaming(|line| {
                    debug!("raxml-ng: {}", line);
                    progress.observe(line);
                })
                .await;

            let errors = progress.take_errors();
            if !errors.is_empty() {
                return Err(PipelineError::RaxmlFailed { errors });
            }
            result?;

            match step {
                "ml" => info!("{} ML tree searches done", progress.ml_trees()),
                "bs" => info!("{} bootstrap trees done", progress.bootstrap_trees()),
                _ => {}
            }
        }

        // both support metrics land next to the run artifacts
        std::fs::copy(
            ctx.paths.raxml_prefix("sp").with_extension("raxml.supportFBP"),
            ctx.paths.tree_file("FBP"),
        )?;
        std::fs::copy(
            ctx.paths.raxml_prefix("sp").with_extension("raxml.supportTBE"),
            ctx.paths.tree_file("TBE"),
        )?;
        info!(
            "support trees copied to {} and {}",
            ctx.paths.tree_file("FBP").display(),
            ctx.paths.tree_file("TBE").display()
        );

        Ok(StageOutput::summary(format!(
            "{} ML searches, {} bootstrap trees, support written for FBP and TBE",
            progress.ml_trees(),
            progress.bootstrap_trees()
        ))
        .with_metadata("ml_trees", progress.ml_trees().to_string())
        .with_metadata("bootstrap_trees", progress.bootstrap_trees().to_string())
        .with_metadata("seed", ctx.seed.to_string()))
    }
}

/// The four raxml-ng invocations, in order: MSA check, ML search,
/// bootstrapping, and branch support.
pub fn build_calls(ctx: &RunContext, msa: &Path) -> Vec<(String, &'static str, Vec<String>)> {
    let raxml = &ctx.config.raxml;
    let threads = raxml.threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let auto_threads = format!("auto{{{}}}", threads);
    let msa = msa.display().to_string();
    let prefix = |step: &str| ctx.paths.raxml_prefix(step).display().to_string();

    let mut start_trees = Vec::new();
    if raxml.start_trees.rand > 0 {
        start_trees.push(format!("rand{{{}}}", raxml.start_trees.rand));
    }
    if raxml.start_trees.pars > 0 {
        start_trees.push(format!("pars{{{}}}", raxml.start_trees.pars));
    }

    let check = vec![
        "--check".to_string(),
        "--msa".to_string(),
        msa.clone(),
        "--model".to_string(),
        raxml.model.clone(),
        "--prefix".to_string(),
        prefix("chk"),
    ];

    let ml = vec![
        "--msa".to_string(),
        msa.clone(),
        "--model".to_string(),
        raxml.model.clone(),
        "--prefix".to_string(),
        prefix("ml"),
        "--seed".to_string(),
        ctx.seed.to_string(),
        "--threads".to_string(),
        auto_threads.clone(),
        "--workers".to_string(),
        auto_threads.clone(),
        "--redo".to_string(),
        "--tree".to_string(),
        start_trees.join(","),
    ];

    let best_model = best_file(ctx, "bestModel");
    let best_tree = best_file(ctx, "bestTree");
    let bootstrap = vec![
        "--bootstrap".to_string(),
        "--msa".to_string(),
        msa,
        "--model".to_string(),
        best_model.display().to_string(),
        "--tree".to_string(),
        best_tree.display().to_string(),
        "--prefix".to_string(),
        prefix("bs"),
        "--bs-trees".to_string(),
        raxml.bootstrap.to_string(),
        "--seed".to_string(),
        ctx.seed.to_string(),
        "--threads".to_string(),
        auto_threads.clone(),
        "--workers".to_string(),
        auto_threads.clone(),
        "--redo".to_string(),
    ];

    let support = vec![
        "--support".to_string(),
        "--tree".to_string(),
        best_tree.display().to_string(),
        "--bs-trees".to_string(),
        ctx.paths
            .raxml_prefix("bs")
            .with_extension("raxml.bootstraps")
            .display()
            .to_string(),
        "--bs-metric".to_string(),
        "fbp,tbe".to_string(),
        "--prefix".to_string(),
        prefix("sp"),
        "--threads".to_string(),
        auto_threads.clone(),
        "--workers".to_string(),
        auto_threads,
        "--redo".to_string(),
    ];

    vec![
        ("check MSA".to_string(), "chk", check),
        ("infer ML tree".to_string(), "ml", ml),
        ("bootstrapping".to_string(), "bs", bootstrap),
        ("calculate branch support".to_string(), "sp", support),
    ]
}

fn best_file(ctx: &RunContext, kind: &str) -> PathBuf {
    ctx.paths
        .raxml_prefix("ml")
        .with_extension(format!("raxml.{}", kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Config;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> RunContext {
        let mut config = Config::default();
        config.output_dir = dir.path().join("results");
        config.seed = Some(42);
        config.raxml.threads = Some(4);
        RunContext::new(config).unwrap()
    }

    #[test]
    fn test_progress_parsing() {
        let progress = RaxmlProgress::default();
        progress.observe("[00:00:05] ML tree search #1, logLikelihood: -4500.1");
        progress.observe("[00:00:09] ML tree search #2, logLikelihood: -4498.7");
        progress.observe("[00:01:00] Bootstrap tree #1, logLikelihood: -4503.2");
        progress.observe("Elapsed time: 61.2 seconds");

        assert_eq!(progress.ml_trees(), 2);
        assert_eq!(progress.bootstrap_trees(), 1);
        assert!(progress.take_errors().is_empty());
    }

    #[test]
    fn test_progress_collects_errors() {
        let progress = RaxmlProgress::default();
        progress.observe("ERROR: Alignment contains duplicate sequences");
        let errors = progress.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("duplicate sequences"));
    }

    #[test]
    fn test_call_shapes() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let calls = build_calls(&ctx, &ctx.paths.msa());

        assert_eq!(calls.len(), 4);
        let (_, step, check) = &calls[0];
        assert_eq!(*step, "chk");
        assert_eq!(check[0], "--check");

        let (_, _, ml) = &calls[1];
        let tree_arg = ml.iter().position(|a| a == "--tree").unwrap();
        assert_eq!(ml[tree_arg + 1], "rand{10},pars{10}");
        assert!(ml.contains(&"--seed".to_string()));
        assert!(ml.contains(&"42".to_string()));
        assert!(ml.contains(&"auto{4}".to_string()));

        let (_, _, bootstrap) = &calls[2];
        assert_eq!(bootstrap[0], "--bootstrap");
        assert!(bootstrap.contains(&"--bs-trees".to_string()));
        assert!(bootstrap.contains(&"100".to_string()));

        let (_, _, support) = &calls[3];
        assert_eq!(support[0], "--support");
        assert!(support.contains(&"fbp,tbe".to_string()));
    }

    #[test]
    fn test_zero_start_trees_omitted() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.output_dir = dir.path().join("results");
        config.seed = Some(1);
        config.raxml.start_trees = crate::cli::StartTrees { rand: 0, pars: 8 };
        let ctx = RunContext::new(config).unwrap();

        let calls = build_calls(&ctx, &ctx.paths.msa());
        let (_, _, ml) = &calls[1];
        let tree_arg = ml.iter().position(|a| a == "--tree").unwrap();
        assert_eq!(ml[tree_arg + 1], "pars{8}");
    }
}
