// ABOUTME: Run context, canonical output layout, and shared pipeline state
// ABOUTME: Every derived file path used by the stages lives here

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rand::Rng;
use tracing::info;

use crate::cli::Config;
use crate::output::tables::{Annotation, BadSeqRow, MetadataRow};
use crate::samples::SampleRegistry;

use super::error::Result;

/// Joined between genes in the concatenated alignment so gene
/// boundaries stay visible.
pub const GENE_SEPARATOR: &str = "SSSSSSSSSS";

/// The canonical layout of a result directory. All stages and the
/// report agree on these names; `visualize`/`view` rediscover a run
/// from them.
#[derive(Debug, Clone)]
pub struct RunPaths {
    root: PathBuf,
}

impl RunPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn gene_dir(&self, gene: &str) -> PathBuf {
        self.root.join(gene)
    }

    /// Shared-samples FASTA, the MSA input.
    pub fn gene_fasta(&self, gene: &str) -> PathBuf {
        self.gene_dir(gene).join(format!("{}.fasta", gene))
    }

    /// Every good record for the gene, shared or not.
    pub fn gene_all_fasta(&self, gene: &str) -> PathBuf {
        self.gene_dir(gene).join(format!("{}_all.fasta", gene))
    }

    pub fn raw_msa(&self, gene: &str) -> PathBuf {
        self.gene_dir(gene).join(format!("{}_raw_msa.fasta", gene))
    }

    pub fn trimmed_msa(&self, gene: &str) -> PathBuf {
        self.gene_dir(gene).join(format!("{}_msa.fasta", gene))
    }

    pub fn tool_log(&self, gene: &str, tool: &str) -> PathBuf {
        self.gene_dir(gene).join(format!("{}.log", tool))
    }

    pub fn metadata(&self) -> PathBuf {
        self.root.join("metadata.tsv")
    }

    pub fn bad_seqs(&self) -> PathBuf {
        self.root.join("bad_seqs.tsv")
    }

    pub fn missing_samples(&self) -> PathBuf {
        self.root.join("missing_samples.tsv")
    }

    pub fn msa(&self) -> PathBuf {
        self.root.join("msa.fasta")
    }

    pub fn missing_fasta(&self) -> PathBuf {
        self.root.join("missing.fasta")
    }

    pub fn local_blast_hits(&self) -> PathBuf {
        self.root.join("local_blast_hits.tsv")
    }

    pub fn remote_blast_hits(&self) -> PathBuf {
        self.root.join("remote_blast_hits.tsv")
    }

    pub fn blast_log(&self) -> PathBuf {
        self.root.join("blast.log")
    }

    pub fn raxml_dir(&self) -> PathBuf {
        self.root.join("raxml")
    }

    pub fn raxml_prefix(&self, step: &str) -> PathBuf {
        self.raxml_dir().join(step)
    }

    pub fn raxml_log(&self, step: &str) -> PathBuf {
        self.raxml_dir().join(format!("{}.log", step))
    }

    pub fn tree_file(&self, metric: &str) -> PathBuf {
        self.root.join(format!("tree_{}.nwk", metric))
    }

    pub fn report(&self) -> PathBuf {
        self.root.join("report.html")
    }

    pub fn result_json(&self) -> PathBuf {
        self.root.join("pipeline_result.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("treeline.log")
    }

    pub fn export_script(&self) -> PathBuf {
        self.root.join("raxml_run.sh")
    }

    pub fn export_archive(&self) -> PathBuf {
        self.root.join("raxml_export.tar.gz")
    }
}

/// Immutable facts of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: Config,
    pub paths: RunPaths,
    pub run_id: String,
    pub seed: u64,
}

impl RunContext {
    pub fn new(config: Config) -> Result<Self> {
        let paths = RunPaths::new(&config.output_dir);
        std::fs::create_dir_all(paths.root())?;

        let seed = config
            .seed
            .unwrap_or_else(|| rand::rng().random_range(0..1000));
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("seed for this run: {}", seed);

        Ok(Self {
            config,
            paths,
            run_id,
            seed,
        })
    }

    pub fn genes(&self) -> &[String] {
        &self.config.genes
    }

    /// The gene whose BLAST hits drive species annotation.
    pub fn annotation_gene(&self) -> Option<&str> {
        self.config.genes.first().map(String::as_str)
    }
}

/// Mutable state threaded through the stages. Each stage fills in what
/// the later ones need; everything here also feeds the report.
#[derive(Debug, Default)]
pub struct PipelineState {
    pub registry: Option<SampleRegistry>,
    /// Sequences written per gene MSA input, for Gblocks parameters.
    pub seq_counts: HashMap<String, usize>,
    pub shared_samples: Vec<String>,
    pub metadata: Vec<MetadataRow>,
    pub bad_seqs: Vec<BadSeqRow>,
    pub annotations: HashMap<String, Annotation>,
    pub missing_by_gene: IndexMap<String, Vec<String>>,
    /// Columns x rows of the concatenated alignment.
    pub msa_shape: Option<(usize, usize)>,
}

impl PipelineState {
    pub fn registry(&self) -> std::result::Result<&SampleRegistry, super::PipelineError> {
        self.registry
            .as_ref()
            .ok_or_else(|| super::PipelineError::MissingInput("sample registry".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_names_match_run_artifacts() {
        let paths = RunPaths::new("/tmp/results");

        assert_eq!(paths.gene_fasta("ITS"), PathBuf::from("/tmp/results/ITS/ITS.fasta"));
        assert_eq!(
            paths.trimmed_msa("ITS"),
            PathBuf::from("/tmp/results/ITS/ITS_msa.fasta")
        );
        assert_eq!(paths.tree_file("TBE"), PathBuf::from("/tmp/results/tree_TBE.nwk"));
        assert_eq!(paths.metadata(), PathBuf::from("/tmp/results/metadata.tsv"));
    }
}
