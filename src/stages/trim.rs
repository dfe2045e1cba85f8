// ABOUTME: Quality trimming stage: traces in, per-gene FASTA files out
// ABOUTME: Builds the sample registry and writes metadata and reject tables

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::output::tables::{self, BadSeqRow, MetadataRow};
use crate::pipeline::{PipelineError, PipelineState, Result, RunContext};
use crate::samples::naming::NamingRules;
use crate::samples::registry::{scan_reference_dir, DiscoveryOptions};
use crate::samples::{PlateBook, SampleRegistry};
use crate::trace::{self, SeqRecord};

use super::{Stage, StageOutput};

pub struct TrimStage;

#[async_trait::async_trait]
impl Stage for TrimStage {
    fn name(&self) -> &'static str {
        "trim"
    }

    async fn execute(&self, ctx: &RunContext, state: &mut PipelineState) -> Result<StageOutput> {
        let mut registry = discover_samples(ctx)?;
        attach_references(ctx, &mut registry)?;

        let quality = &ctx.config.quality;
        let mut bad_seqs: Vec<BadSeqRow> = Vec::new();
        let mut metadata: Vec<MetadataRow> = Vec::new();
        // gene -> sample id -> trimmed record, insertion-ordered
        let mut per_gene: IndexMap<String, IndexMap<String, SeqRecord>> = IndexMap::new();
        let mut ref_ids: HashSet<String> = HashSet::new();

        for gene in registry.genes.clone() {
            per_gene.entry(gene.clone()).or_default();

            for record_info in registry.records_for(&gene) {
                let file = record_info
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut reject = |reason: &str, rows: &mut Vec<BadSeqRow>| {
                    debug!("dropping {} ({}): {}", record_info.sample_id, gene, reason);
                    rows.push(BadSeqRow {
                        sample: record_info.sample_id.clone(),
                        gene: gene.clone(),
                        file: file.clone(),
                        reason: reason.to_string(),
                    });
                };

                if record_info.is_reverse && !quality.accept_reverse {
                    reject("reverse read not accepted", &mut bad_seqs);
                    continue;
                }

                let mut record = match trace::read_trace(&record_info.path) {
                    Ok(record) => record,
                    Err(e) => {
                        reject(&e.to_string(), &mut bad_seqs);
                        continue;
                    }
                };
                if record_info.is_reverse {
                    record.reverse_complement();
                }

                let record = match trace::trim_ends(&record, quality.min_phred, quality.end_ratio)
                {
                    Ok(trimmed) => {
                        trace::mark_bad_stretches(&trimmed, quality.min_phred, quality.bad_stretch)
                    }
                    Err(e) => {
                        reject(&e.to_string(), &mut bad_seqs);
                        continue;
                    }
                };

                metadata.push(MetadataRow {
                    sample: record_info.sample_id.clone(),
                    gene: gene.clone(),
                    file,
                    well: record_info.well.clone(),
                    is_reverse: record_info.is_reverse,
                    is_reference: false,
                    trimmed_length: record.len(),
                });
                per_gene.get_mut(&gene).unwrap().insert(
                    record_info.sample_id.clone(),
                    SeqRecord::with_quals(
                        record_info.sample_id.clone(),
                        record.seq,
                        record.quals.unwrap_or_default(),
                    ),
                );
            }

            // reference sequences carry no phreds and skip trimming
            if let Some(ref_path) = registry.references.get(&gene) {
                if !quality.accept_nophred {
                    warn!("references carry no phred scores but accept_nophred is off; keeping them anyway");
                }
                for reference in trace::read_fasta(ref_path)? {
                    metadata.push(MetadataRow {
                        sample: reference.id.clone(),
                        gene: gene.clone(),
                        file: ref_path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        well: None,
                        is_reverse: false,
                        is_reference: true,
                        trimmed_length: reference.len(),
                    });
                    ref_ids.insert(reference.id.clone());
                    per_gene
                        .get_mut(&gene)
                        .unwrap()
                        .insert(reference.id.clone(), reference);
                }
            }
        }

        let survivors: usize = per_gene.values().map(|m| m.len()).sum();
        if survivors == 0 {
            return Err(PipelineError::NothingSurvivedTrimming);
        }

        // samples present in every gene make it into the MSA inputs;
        // references count only for their own gene
        let shared = shared_samples(&per_gene, &ref_ids);
        info!(
            "{} records survived trimming, {} samples shared across all genes",
            survivors,
            shared.len()
        );

        let mut seq_counts: HashMap<String, usize> = HashMap::new();
        for (gene, records) in &per_gene {
            let all: Vec<SeqRecord> = records.values().cloned().collect();
            trace::write_fasta(&ctx.paths.gene_all_fasta(gene), &all)?;

            let for_msa: Vec<SeqRecord> = records
                .values()
                .filter(|r| shared.contains(&r.id) || ref_ids.contains(&r.id))
                .cloned()
                .collect();
            if for_msa.is_empty() {
                warn!("no shared sequences for {}; downstream stages will fail", gene);
            }
            seq_counts.insert(gene.clone(), for_msa.len());
            trace::write_fasta(&ctx.paths.gene_fasta(gene), &for_msa)?;
        }

        tables::write_metadata(&ctx.paths.metadata(), &metadata, &HashMap::new())?;
        tables::write_bad_seqs(&ctx.paths.bad_seqs(), &bad_seqs)?;

        let output = StageOutput::summary(format!(
            "{} records trimmed, {} rejected, {} shared samples",
            survivors,
            bad_seqs.len(),
            shared.len()
        ))
        .with_metadata("records", survivors.to_string())
        .with_metadata("rejected", bad_seqs.len().to_string())
        .with_metadata("shared_samples", shared.len().to_string());

        state.registry = Some(registry);
        state.seq_counts = seq_counts;
        state.shared_samples = shared;
        state.metadata = metadata;
        state.bad_seqs = bad_seqs;
        Ok(output)
    }
}

fn discover_samples(ctx: &RunContext) -> Result<SampleRegistry> {
    let rules = NamingRules::from_config(&ctx.config.naming)?;
    let abi_dir = ctx
        .config
        .abi_dir
        .as_deref()
        .ok_or(crate::samples::SampleError::NoTraceDir)?;
    let plates = match ctx.config.csv_dir.as_deref() {
        Some(dir) => PlateBook::load(dir)?,
        None => PlateBook::empty(),
    };
    if !plates.is_empty() {
        info!("{} plate layouts loaded", plates.len());
    }

    Ok(SampleRegistry::discover(DiscoveryOptions {
        abi_dir,
        genes: &ctx.config.genes,
        rules: &rules,
        plates: &plates,
        abi_whitelist: ctx.config.abi_set.as_deref(),
        sample_whitelist: ctx.config.sample_set.as_deref(),
    })?)
}

fn attach_references(ctx: &RunContext, registry: &mut SampleRegistry) -> Result<()> {
    let refs = if let Some(ref dir) = ctx.config.ref_dir {
        scan_reference_dir(dir)?
    } else {
        ctx.config.refs.clone()
    };
    if refs.is_empty() {
        return Ok(());
    }
    registry.attach_references(&refs, ctx.config.refs_by_order())?;
    Ok(())
}

fn shared_samples(
    per_gene: &IndexMap<String, IndexMap<String, SeqRecord>>,
    ref_ids: &HashSet<String>,
) -> Vec<String> {
    let mut genes = per_gene.values();
    let first = match genes.next() {
        Some(first) => first,
        None => return Vec::new(),
    };
    first
        .keys()
        .filter(|id| !ref_ids.contains(*id))
        .filter(|id| per_gene.values().all(|records| records.contains_key(*id)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(ids: &[&str]) -> IndexMap<String, SeqRecord> {
        ids.iter()
            .map(|id| (id.to_string(), SeqRecord::new(*id, b"ACGT".to_vec())))
            .collect()
    }

    #[test]
    fn test_shared_samples_intersection() {
        let mut per_gene = IndexMap::new();
        per_gene.insert("ITS".to_string(), records(&["s1", "s2", "s3"]));
        per_gene.insert("OPA10".to_string(), records(&["s2", "s3", "s4"]));

        let shared = shared_samples(&per_gene, &HashSet::new());
        assert_eq!(shared, vec!["s2".to_string(), "s3".to_string()]);
    }

    #[test]
    fn test_references_do_not_gate_sharing() {
        let mut per_gene = IndexMap::new();
        per_gene.insert("ITS".to_string(), records(&["s1", "REF1"]));
        per_gene.insert("OPA10".to_string(), records(&["s1"]));

        let refs: HashSet<String> = ["REF1".to_string()].into_iter().collect();
        let shared = shared_samples(&per_gene, &refs);
        assert_eq!(shared, vec!["s1".to_string()]);
    }

    #[test]
    fn test_single_gene_shares_everything() {
        let mut per_gene = IndexMap::new();
        per_gene.insert("ITS".to_string(), records(&["s1", "s2"]));

        let shared = shared_samples(&per_gene, &HashSet::new());
        assert_eq!(shared.len(), 2);
    }
}
