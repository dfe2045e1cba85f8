// ABOUTME: Alignment concatenation stage
// ABOUTME: Joins per-gene MSAs per sample and tracks missing samples

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::output::tables;
use crate::pipeline::{context::GENE_SEPARATOR, PipelineError, PipelineState, Result, RunContext};
use crate::trace::{self, SeqRecord};

use super::{Stage, StageOutput};

pub struct ConcatStage;

#[async_trait::async_trait]
impl Stage for ConcatStage {
    fn name(&self) -> &'static str {
        "concat"
    }

    async fn execute(&self, ctx: &RunContext, state: &mut PipelineState) -> Result<StageOutput> {
        let genes = state.registry()?.genes.clone();

        // all trimmed MSAs in memory, uppercased, insertion-ordered
        let mut per_gene: IndexMap<String, IndexMap<String, SeqRecord>> = IndexMap::new();
        for gene in &genes {
            let mut records = IndexMap::new();
            for mut record in trace::read_fasta(&ctx.paths.trimmed_msa(gene))? {
                record.to_uppercase();
                records.insert(record.id.clone(), record);
            }
            per_gene.insert(gene.clone(), records);
        }

        let total_columns: usize = per_gene
            .values()
            .filter_map(|records| records.values().next().map(|r| r.len()))
            .sum();
        if total_columns == 0 {
            return Err(PipelineError::NoConservedSites {
                gene: genes.first().cloned().unwrap_or_default(),
            });
        }

        let mut missing_by_gene: IndexMap<String, Vec<String>> = genes
            .iter()
            .map(|gene| (gene.clone(), Vec::new()))
            .collect();
        let mut concatenated: Vec<SeqRecord> = Vec::new();

        let first_gene_ids: Vec<String> = per_gene
            .first()
            .map(|(_, records)| records.keys().cloned().collect())
            .unwrap_or_default();

        for sample_id in &first_gene_ids {
            let mut seq = per_gene[0][sample_id].seq.clone();
            let mut complete = true;

            for gene in genes.iter().skip(1) {
                match per_gene.get(gene).and_then(|records| records.get(sample_id)) {
                    Some(record) => {
                        seq.extend_from_slice(GENE_SEPARATOR.as_bytes());
                        seq.extend_from_slice(&record.seq);
                    }
                    None => {
                        missing_by_gene
                            .get_mut(gene)
                            .map(|list| list.push(sample_id.clone()));
                        complete = false;
                    }
                }
            }
            if complete {
                concatenated.push(SeqRecord::new(sample_id.clone(), seq));
            }
        }

        // whatever the first gene never saw is missing from it
        for gene in genes.iter().skip(1) {
            if let Some(records) = per_gene.get(gene) {
                let absent: Vec<String> = records
                    .keys()
                    .filter(|id| !first_gene_ids.contains(*id))
                    .cloned()
                    .collect();
                if let Some(first) = genes.first() {
                    if let Some(list) = missing_by_gene.get_mut(first) {
                        for id in absent {
                            if !list.contains(&id) {
                                list.push(id);
                            }
                        }
                    }
                }
            }
        }

        if genes.len() > 1 && concatenated.is_empty() {
            return Err(PipelineError::NoSharedSamples);
        }

        trace::write_fasta(&ctx.paths.msa(), &concatenated)?;
        tables::write_missing_samples(&ctx.paths.missing_samples(), &missing_by_gene)?;
        for (gene, samples) in &missing_by_gene {
            if samples.is_empty() {
                info!("samples missing from {}: None", gene);
            } else {
                warn!("samples missing from {}: {}", gene, samples.join(", "));
            }
        }

        let columns = total_columns + GENE_SEPARATOR.len() * genes.len().saturating_sub(1);
        let rows = concatenated.len();
        info!("finished writing concatenated MSA with {} entries", rows);
        info!("MSA shape: {}x{}", columns, rows);
        state.msa_shape = Some((columns, rows));
        state.missing_by_gene = missing_by_gene;

        Ok(StageOutput::summary(format!("MSA shape {}x{}", columns, rows))
            .with_metadata("columns", columns.to_string())
            .with_metadata("rows", rows.to_string()))
    }
}
