// ABOUTME: Sample registry: trace discovery, whitelisting, and versioning
// ABOUTME: Also matches reference FASTA files to genes by order or by name

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::{Result, SampleError};
use super::naming::{Locator, NamingRules};
use super::plates::PlateBook;

/// One trace file resolved to a sample/gene pair.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub sample_id: String,
    pub gene: String,
    pub path: PathBuf,
    pub well: Option<String>,
    pub is_reverse: bool,
}

/// Everything the pipeline knows about its inputs before reading a
/// single trace: which genes exist, which file belongs to which
/// sample, and which reference goes with which gene.
#[derive(Debug, Clone, Default)]
pub struct SampleRegistry {
    pub genes: Vec<String>,
    pub records: Vec<SampleRecord>,
    pub references: IndexMap<String, PathBuf>,
}

pub struct DiscoveryOptions<'a> {
    pub abi_dir: &'a Path,
    pub genes: &'a [String],
    pub rules: &'a NamingRules,
    pub plates: &'a PlateBook,
    pub abi_whitelist: Option<&'a Path>,
    pub sample_whitelist: Option<&'a Path>,
}

impl SampleRegistry {
    pub fn discover(opts: DiscoveryOptions<'_>) -> Result<Self> {
        let abi_filter = opts.abi_whitelist.map(read_whitelist).transpose()?;
        let sample_filter = opts.sample_whitelist.map(read_whitelist).transpose()?;

        let mut trace_files: Vec<PathBuf> = WalkDir::new(opts.abi_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().map(|e| e == "ab1").unwrap_or(false))
            .collect();
        trace_files.sort();

        if trace_files.is_empty() {
            return Err(SampleError::NoTraces {
                dir: opts.abi_dir.to_path_buf(),
            });
        }
        info!(
            "found {} trace files under {}",
            trace_files.len(),
            opts.abi_dir.display()
        );

        let mut records = Vec::new();
        let mut seen_genes: Vec<String> = Vec::new();
        let mut version_counts: HashMap<(String, String), usize> = HashMap::new();

        for path in trace_files {
            if let Some(ref filter) = abi_filter {
                if !whitelisted_path(&path, filter) {
                    debug!("skipping {} (not in trace whitelist)", path.display());
                    continue;
                }
            }

            let stem = match path.file_stem().map(|s| s.to_string_lossy().into_owned()) {
                Some(stem) => stem,
                None => continue,
            };
            let name = match opts.rules.parse(&stem)? {
                Some(name) => name,
                None => {
                    debug!("skipping {} (name does not match trace pattern)", stem);
                    continue;
                }
            };

            if !opts.genes.is_empty()
                && !opts
                    .genes
                    .iter()
                    .any(|g| g.eq_ignore_ascii_case(&name.gene))
            {
                debug!("skipping {} (gene {} not selected)", stem, name.gene);
                continue;
            }

            let (base_id, well) = match &name.locator {
                Locator::Sample(sample) => (sample.clone(), None),
                Locator::Well { plate, well } => {
                    let id = if opts.plates.is_empty() {
                        format!("{}_{}", plate, well)
                    } else {
                        opts.plates.resolve(plate, *well, &path)?
                    };
                    (id, Some(well.to_string()))
                }
            };

            if let Some(ref filter) = sample_filter {
                if !filter.contains(&base_id) {
                    debug!("skipping {} (sample {} not in whitelist)", stem, base_id);
                    continue;
                }
            }

            // later versions of the same sample/gene pair get an ordinal suffix
            let count = version_counts
                .entry((name.gene.clone(), base_id.clone()))
                .or_insert(0);
            let sample_id = if *count == 0 {
                base_id.clone()
            } else {
                format!("{}.{}", base_id, count)
            };
            *count += 1;

            if !seen_genes.iter().any(|g| g == &name.gene) {
                seen_genes.push(name.gene.clone());
            }
            records.push(SampleRecord {
                sample_id,
                gene: name.gene,
                path,
                well,
                is_reverse: name.is_reverse,
            });
        }

        // configured gene order wins; otherwise keep discovery order
        let genes = if opts.genes.is_empty() {
            seen_genes
        } else {
            opts.genes.to_vec()
        };
        if genes.is_empty() || records.is_empty() {
            return Err(SampleError::NoGenes);
        }

        info!(
            "registered {} records across {} gene(s): {}",
            records.len(),
            genes.len(),
            genes.join(", ")
        );

        Ok(Self {
            genes,
            records,
            references: IndexMap::new(),
        })
    }

    /// Attach reference FASTA files. With `by_order` the file list is
    /// zipped against the gene list; otherwise each file must share a
    /// name with exactly the gene it belongs to.
    pub fn attach_references(&mut self, refs: &[PathBuf], by_order: bool) -> Result<()> {
        if by_order {
            if refs.len() > self.genes.len() {
                warn!(
                    "{} reference files for {} genes; extras are ignored",
                    refs.len(),
                    self.genes.len()
                );
            }
            for (gene, path) in self.genes.iter().zip(refs.iter()) {
                self.references.insert(gene.clone(), path.clone());
            }
        } else {
            for path in refs {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_ascii_lowercase())
                    .unwrap_or_default();
                let gene = self
                    .genes
                    .iter()
                    .find(|g| {
                        let g = g.to_ascii_lowercase();
                        stem.contains(&g) || g.contains(&stem)
                    })
                    .cloned()
                    .ok_or_else(|| SampleError::UnmatchedGene { gene: stem.clone() })?;
                self.references.insert(gene, path.clone());
            }
        }
        for (gene, path) in &self.references {
            info!("reference for {}: {}", gene, path.display());
        }
        Ok(())
    }

    pub fn records_for<'a>(&'a self, gene: &'a str) -> impl Iterator<Item = &'a SampleRecord> + 'a {
        self.records.iter().filter(move |r| r.gene == gene)
    }

    pub fn sample_count(&self) -> usize {
        let ids: HashSet<_> = self.records.iter().map(|r| r.sample_id.as_str()).collect();
        ids.len()
    }
}

/// Scan a directory for reference FASTA files, the `--ref-dir` shape.
pub fn scan_reference_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut refs: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|e| e == "fasta" || e == "fa")
                .unwrap_or(false)
        })
        .collect();
    refs.sort();
    Ok(refs)
}

fn read_whitelist(path: &Path) -> Result<HashSet<String>> {
    let content = std::fs::read_to_string(path)?;
    let entries: HashSet<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    if entries.is_empty() {
        return Err(SampleError::EmptyWhitelist {
            path: path.to_path_buf(),
        });
    }
    Ok(entries)
}

fn whitelisted_path(path: &Path, filter: &HashSet<String>) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    filter.contains(&name)
        || filter
            .iter()
            .any(|entry| path.to_string_lossy().ends_with(entry.as_str()))
}
