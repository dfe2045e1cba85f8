// ABOUTME: Configuration management for the treeline application
// ABOUTME: Handles loading and merging configuration from files and environment variables

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::samples::naming::NamingConfig;
use crate::trace::EndRatio;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of ABI trace files.
    #[serde(default)]
    pub abi_dir: Option<PathBuf>,

    /// Directory of plate layout CSVs (well-to-isolate coordinates).
    #[serde(default)]
    pub csv_dir: Option<PathBuf>,

    /// Whitelist file restricting which trace files are read.
    #[serde(default)]
    pub abi_set: Option<PathBuf>,

    /// Whitelist file restricting which sample IDs are kept.
    #[serde(default)]
    pub sample_set: Option<PathBuf>,

    /// Genes to consider; the first drives species annotation.
    #[serde(default)]
    pub genes: Vec<String>,

    /// Reference FASTA files, matched to genes by order or name.
    #[serde(default)]
    pub refs: Vec<PathBuf>,

    /// Directory scanned for reference FASTA files.
    #[serde(default)]
    pub ref_dir: Option<PathBuf>,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Seed for reproducible tree inference; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub blast: BlastConfig,

    #[serde(default)]
    pub msa: MsaConfig,

    #[serde(default)]
    pub gblocks: GblocksConfig,

    #[serde(default)]
    pub raxml: RaxmlConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            abi_dir: None,
            csv_dir: None,
            abi_set: None,
            sample_set: None,
            genes: Vec::new(),
            refs: Vec::new(),
            ref_dir: None,
            output_dir: default_output_dir(),
            seed: None,
            naming: NamingConfig::default(),
            quality: QualityConfig::default(),
            blast: BlastConfig::default(),
            msa: MsaConfig::default(),
            gblocks: GblocksConfig::default(),
            raxml: RaxmlConfig::default(),
            remote: RemoteConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimal phred score for a base to count as good.
    pub min_phred: u8,
    /// Runs of at least this many bad bases are replaced by Ns.
    pub bad_stretch: usize,
    /// Good-end requirement for trimming, as `<good>/<of>`.
    pub end_ratio: EndRatio,
    /// Keep records without phred scores (plain FASTA input).
    pub accept_nophred: bool,
    /// Keep reverse reads (reverse-complemented on ingest).
    pub accept_reverse: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_phred: 30,
            bad_stretch: 5,
            end_ratio: EndRatio::default(),
            accept_nophred: true,
            accept_reverse: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlastConfig {
    /// Skip BLAST entirely when false.
    pub enabled: bool,
    /// Allow falling back to the NCBI URL API for missing sequences.
    pub remote: bool,
    /// BLAST+ database name.
    pub db: String,
    /// Directory containing the local BLAST+ database.
    pub db_path: Option<PathBuf>,
    /// Build the local database from this FASTA if it does not exist.
    pub make_db_from: Option<PathBuf>,
    pub timeout_seconds: u64,
}

impl Default for BlastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote: true,
            db: "nt".to_string(),
            db_path: None,
            make_db_from: None,
            timeout_seconds: 1800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MsaAlgo {
    Mafft,
    Clustalo,
    Muscle,
    #[value(name = "t_coffee")]
    #[serde(rename = "t_coffee")]
    TCoffee,
}

impl MsaAlgo {
    pub fn as_str(&self) -> &'static str {
        match self {
            MsaAlgo::Mafft => "mafft",
            MsaAlgo::Clustalo => "clustalo",
            MsaAlgo::Muscle => "muscle",
            MsaAlgo::TCoffee => "t_coffee",
        }
    }

    /// Tool name in the EBI job dispatcher REST API.
    pub fn ebi_name(&self) -> &'static str {
        match self {
            MsaAlgo::TCoffee => "tcoffee",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for MsaAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MsaConfig {
    pub algo: MsaAlgo,
    /// Explicit path to the aligner binary; PATH lookup otherwise.
    pub binary: Option<PathBuf>,
    pub timeout_seconds: u64,
}

impl Default for MsaConfig {
    fn default() -> Self {
        Self {
            algo: MsaAlgo::Mafft,
            binary: None,
            timeout_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GblocksPreset {
    Skip,
    Relaxed,
    #[default]
    Balanced,
    Default,
    Strict,
}

impl GblocksPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            GblocksPreset::Skip => "skip",
            GblocksPreset::Relaxed => "relaxed",
            GblocksPreset::Balanced => "balanced",
            GblocksPreset::Default => "default",
            GblocksPreset::Strict => "strict",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GblocksConfig {
    pub preset: GblocksPreset,
    pub binary: Option<PathBuf>,
}

impl Default for GblocksConfig {
    fn default() -> Self {
        Self {
            preset: GblocksPreset::Balanced,
            binary: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum SupportMetric {
    #[default]
    #[serde(rename = "TBE")]
    #[value(name = "TBE")]
    Tbe,
    #[serde(rename = "FBP")]
    #[value(name = "FBP")]
    Fbp,
}

impl SupportMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportMetric::Tbe => "TBE",
            SupportMetric::Fbp => "FBP",
        }
    }
}

impl fmt::Display for SupportMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numbers of random and parsimony-based starting trees, `<rand>,<pars>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StartTrees {
    pub rand: u32,
    pub pars: u32,
}

impl Default for StartTrees {
    fn default() -> Self {
        Self { rand: 10, pars: 10 }
    }
}

impl FromStr for StartTrees {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');
        let invalid = || format!("invalid start trees '{}': expected <rand>,<pars>", s);
        let (rand, pars) = trimmed.split_once(',').ok_or_else(invalid)?;
        Ok(Self {
            rand: rand.trim().parse().map_err(|_| invalid())?,
            pars: pars.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for StartTrees {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StartTrees> for String {
    fn from(value: StartTrees) -> Self {
        format!("{},{}", value.rand, value.pars)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaxmlConfig {
    /// Explicit path to raxml-ng; PATH lookup otherwise.
    pub binary: Option<PathBuf>,
    pub model: String,
    pub start_trees: StartTrees,
    /// Maximum number of bootstrap trees; must be > 1.
    pub bootstrap: u32,
    pub metric: SupportMetric,
    /// Thread cap passed as `--threads auto{N}`; CPU count when unset.
    pub threads: Option<usize>,
}

impl Default for RaxmlConfig {
    fn default() -> Self {
        Self {
            binary: None,
            model: "GTR+G".to_string(),
            start_trees: StartTrees::default(),
            bootstrap: 100,
            metric: SupportMetric::default(),
            threads: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Master switch for web-service fallbacks (EBI aligners).
    pub enabled: bool,
    /// Contact email required by the EBI job dispatcher.
    pub email: String,
    pub poll_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            email: "anonymous@example.org".to_string(),
            poll_seconds: 20,
            timeout_seconds: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file path or default locations.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_config_file(),
        };

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&contents)?
        } else {
            Config::default()
        };
        config.merge_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Find a configuration file in the standard locations.
    fn find_config_file() -> PathBuf {
        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".treeline").join("config.yaml");
            if home_config.exists() {
                return home_config;
            }
        }

        for name in ["treeline.yaml", "treeline.yml", ".treeline.yaml"] {
            let path = PathBuf::from(name);
            if path.exists() {
                return path;
            }
        }

        PathBuf::from("treeline.yaml")
    }

    /// Merge environment variables into the configuration.
    fn merge_env(&mut self) -> Result<()> {
        if let Ok(level) = std::env::var("TREELINE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TREELINE_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(db) = std::env::var("TREELINE_BLAST_DB") {
            self.blast.db = db;
        }
        // the conventional BLAST+ variable also locates the database
        if self.blast.db_path.is_none() {
            if let Ok(db_path) = std::env::var("BLASTDB") {
                self.blast.db_path = Some(PathBuf::from(db_path));
            }
        }
        if let Ok(email) = std::env::var("TREELINE_EMAIL") {
            self.remote.email = email;
        }
        if let Ok(port) = std::env::var("TREELINE_PORT") {
            self.server.port = port.parse()?;
        }
        Ok(())
    }

    /// Reject configurations the pipeline cannot act on sensibly.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for gene in &self.genes {
            if !seen.insert(gene.to_ascii_lowercase()) {
                anyhow::bail!("duplicate gene in configuration: {}", gene);
            }
        }

        let mut seen_refs = std::collections::HashSet::new();
        for reference in &self.refs {
            if !seen_refs.insert(reference.clone()) {
                anyhow::bail!("duplicate reference file: {}", reference.display());
            }
        }

        if !self.refs.is_empty() && self.ref_dir.is_some() {
            anyhow::bail!("provide at most one of refs / ref_dir");
        }
        if self.raxml.bootstrap <= 1 {
            anyhow::bail!("number of bootstrap trees must be > 1");
        }
        Ok(())
    }

    /// References match genes by order when they were listed explicitly
    /// and genes are set too (or there is exactly one reference);
    /// otherwise matching falls back to file names.
    pub fn refs_by_order(&self) -> bool {
        !self.refs.is_empty() && (!self.genes.is_empty() || self.refs.len() == 1)
    }
}
