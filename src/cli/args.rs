// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and subcommands for treeline

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use super::config::{GblocksPreset, MsaAlgo, StartTrees, SupportMetric};
use crate::trace::EndRatio;

#[derive(Parser)]
#[command(name = "treeline")]
#[command(about = "Phylogenetic tree inference from ABI trace files, start to report")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: traces to tree and report
    Run {
        #[command(flatten)]
        opts: RunOpts,

        #[arg(long, help = "Do not start the preview server or open a browser")]
        headless: bool,
    },

    /// Validate inputs, configuration, and tool availability without running
    Check {
        #[command(flatten)]
        opts: RunOpts,
    },

    /// Re-render the HTML report from an earlier run's result directory
    Visualize {
        #[arg(help = "Path to results of an earlier run")]
        result_dir: Option<PathBuf>,
    },

    /// Serve an existing result directory over local HTTP
    View {
        #[arg(help = "Path to results of an earlier run")]
        result_dir: Option<PathBuf>,

        #[arg(short, long, help = "Port to serve on")]
        port: Option<u16>,

        #[arg(long, help = "Do not open a browser")]
        headless: bool,
    },

    /// Write a portable RAxML-NG script and archive for another machine
    Export {
        #[arg(help = "Path to results of an earlier run")]
        result_dir: Option<PathBuf>,

        #[arg(long, help = "Bundle this raxml-ng binary into the archive")]
        binary: Option<PathBuf>,
    },
}

/// Options shared by `run` and `check`; every flag overrides its
/// counterpart from the configuration file.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RunOpts {
    // FILE I/O
    #[arg(long, value_name = "DIR", help = "Root directory of ABI trace files")]
    pub abi_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Whitelist of trace files to read")]
    pub abi_set: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Whitelist of sample IDs to keep")]
    pub sample_set: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Directory of well-to-isolate plate CSVs")]
    pub csv_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Output directory")]
    pub dir: Option<PathBuf>,

    #[arg(
        short,
        long,
        num_args = 1..,
        help = "Gene(s) to consider; the first drives species annotation"
    )]
    pub genes: Vec<String>,

    #[arg(
        long = "ref",
        value_name = "FILE",
        num_args = 1..,
        conflicts_with = "ref_dir",
        help = "Reference FASTA file(s), matched to genes by order or name"
    )]
    pub refs: Vec<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Directory of reference FASTA files")]
    pub ref_dir: Option<PathBuf>,

    // QUALITY
    #[arg(long, help = "Minimal phred score for a good base")]
    pub min_phred: Option<u8>,

    #[arg(long, help = "Bad bases in a row replaced by Ns")]
    pub bad_stretch: Option<usize>,

    #[arg(long, value_parser = EndRatio::from_str, help = "Good-end window as <good>/<of>")]
    pub end_ratio: Option<EndRatio>,

    // BLAST
    #[arg(long, conflicts_with = "no_blast", help = "Skip online BLAST for missing sequences")]
    pub no_remote: bool,

    #[arg(long, help = "Skip BLAST entirely")]
    pub no_blast: bool,

    #[arg(long, help = "BLAST+ database name")]
    pub db: Option<String>,

    #[arg(long, value_name = "DIR", help = "Directory with the local BLAST+ database")]
    pub db_path: Option<PathBuf>,

    // MSA
    #[arg(long, value_enum, help = "Multiple sequence alignment algorithm")]
    pub msa_algo: Option<MsaAlgo>,

    #[arg(long, value_enum, help = "Gblocks trimming preset")]
    pub gblocks: Option<GblocksPreset>,

    // RAxML-NG
    #[arg(long, value_parser = StartTrees::from_str, help = "Starting trees as <rand>,<pars>")]
    pub start_trees: Option<StartTrees>,

    #[arg(long, help = "Maximum number of bootstrap trees")]
    pub bootstrap: Option<u32>,

    #[arg(long, value_enum, help = "Bootstrap support metric")]
    pub metric: Option<SupportMetric>,

    #[arg(short, long, help = "Seed for reproducible results")]
    pub seed: Option<u64>,
}

impl Args {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl RunOpts {
    /// Fold command-line overrides into a loaded configuration.
    pub fn apply_to(&self, config: &mut super::Config) {
        if let Some(ref dir) = self.abi_dir {
            config.abi_dir = Some(dir.clone());
        }
        if let Some(ref dir) = self.csv_dir {
            config.csv_dir = Some(dir.clone());
        }
        if let Some(ref file) = self.abi_set {
            config.abi_set = Some(file.clone());
        }
        if let Some(ref file) = self.sample_set {
            config.sample_set = Some(file.clone());
        }
        if let Some(ref dir) = self.dir {
            config.output_dir = dir.clone();
        }
        if !self.genes.is_empty() {
            config.genes = self.genes.clone();
        }
        if !self.refs.is_empty() {
            config.refs = self.refs.clone();
            config.ref_dir = None;
        }
        if let Some(ref dir) = self.ref_dir {
            config.ref_dir = Some(dir.clone());
            config.refs.clear();
        }
        if let Some(min_phred) = self.min_phred {
            config.quality.min_phred = min_phred;
        }
        if let Some(bad_stretch) = self.bad_stretch {
            config.quality.bad_stretch = bad_stretch;
        }
        if let Some(end_ratio) = self.end_ratio {
            config.quality.end_ratio = end_ratio;
        }
        if self.no_blast {
            config.blast.enabled = false;
        }
        if self.no_remote {
            config.blast.remote = false;
            config.remote.enabled = false;
        }
        if let Some(ref db) = self.db {
            config.blast.db = db.clone();
        }
        if let Some(ref db_path) = self.db_path {
            config.blast.db_path = Some(db_path.clone());
        }
        if let Some(algo) = self.msa_algo {
            config.msa.algo = algo;
        }
        if let Some(preset) = self.gblocks {
            config.gblocks.preset = preset;
        }
        if let Some(start_trees) = self.start_trees {
            config.raxml.start_trees = start_trees;
        }
        if let Some(bootstrap) = self.bootstrap {
            config.raxml.bootstrap = bootstrap;
        }
        if let Some(metric) = self.metric {
            config.raxml.metric = metric;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Config;

    #[test]
    fn test_run_opts_override_config() {
        let mut config = Config::default();
        let opts = RunOpts {
            genes: vec!["ITS".to_string()],
            min_phred: Some(25),
            no_blast: true,
            gblocks: Some(GblocksPreset::Strict),
            seed: Some(4),
            ..Default::default()
        };
        opts.apply_to(&mut config);

        assert_eq!(config.genes, vec!["ITS".to_string()]);
        assert_eq!(config.quality.min_phred, 25);
        assert!(!config.blast.enabled);
        assert_eq!(config.gblocks.preset, GblocksPreset::Strict);
        assert_eq!(config.seed, Some(4));
    }

    #[test]
    fn test_unset_opts_leave_config_alone() {
        let mut config = Config::default();
        config.quality.min_phred = 20;
        RunOpts::default().apply_to(&mut config);
        assert_eq!(config.quality.min_phred, 20);
        assert!(config.blast.enabled);
    }

    #[test]
    fn test_cli_parses_run_command() {
        let args = Args::parse_from([
            "treeline",
            "run",
            "--abi-dir",
            "traces",
            "-g",
            "ITS",
            "OPA10",
            "--end-ratio",
            "3/4",
            "--start-trees",
            "5,5",
            "--metric",
            "FBP",
        ]);
        match args.command {
            Commands::Run { opts, headless } => {
                assert!(!headless);
                assert_eq!(opts.genes, vec!["ITS".to_string(), "OPA10".to_string()]);
                assert_eq!(opts.end_ratio, Some(EndRatio { good: 3, of: 4 }));
                assert_eq!(opts.start_trees, Some(StartTrees { rand: 5, pars: 5 }));
                assert_eq!(opts.metric, Some(SupportMetric::Fbp));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_no_blast_conflicts_with_no_remote() {
        let result =
            Args::try_parse_from(["treeline", "run", "--no-blast", "--no-remote"]);
        assert!(result.is_err());
    }
}
