// ABOUTME: Report context assembly and Handlebars rendering
// ABOUTME: Reads run artifacts back from disk so visualize works standalone

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use handlebars::Handlebars;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cli::{Config, SupportMetric};
use crate::output::{self, tables};
use crate::pipeline::RunPaths;

use super::error::{ReportError, Result};
use super::layout;
use super::newick::Tree;
use super::templates::REPORT_TEMPLATE;

#[derive(Debug, Serialize)]
struct StageRow {
    name: String,
    status: String,
    duration: String,
    detail: String,
}

#[derive(Debug, Serialize)]
struct SampleRow {
    sample: String,
    genes: String,
    length: String,
    species: String,
    identity: String,
}

#[derive(Debug, Serialize)]
struct MissingRow {
    gene: String,
    samples: String,
}

#[derive(Debug, Serialize)]
struct BadSeqDisplayRow {
    sample: String,
    gene: String,
    file: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct ReportContext {
    run_id: String,
    seed: String,
    generated: String,
    genes: String,
    msa_algo: String,
    gblocks_preset: String,
    bootstrap: String,
    metric: String,
    other_metric: String,
    msa_shape: Option<String>,
    has_both_metrics: bool,
    tree_svg: String,
    other_tree_svg: String,
    stages: Vec<StageRow>,
    samples: Vec<SampleRow>,
    missing: Vec<MissingRow>,
    bad_seqs: Vec<BadSeqDisplayRow>,
}

/// Render report.html from the artifacts in a result directory.
pub async fn build_report(paths: &RunPaths, config: &Config) -> Result<()> {
    let context = build_context(paths, config)?;

    let mut handlebars = Handlebars::new();
    handlebars.register_template_string("report", REPORT_TEMPLATE)?;
    let html = handlebars.render("report", &context)?;

    tokio::fs::write(paths.report(), html).await?;
    Ok(())
}

fn build_context(paths: &RunPaths, config: &Config) -> Result<ReportContext> {
    let (primary_metric, primary_tree, secondary) = load_trees(paths, config.raxml.metric)?;
    let tree_svg = layout::render_svg(&primary_tree);
    let (other_metric, other_tree_svg) = match secondary {
        Some((metric, tree)) => (metric, layout::render_svg(&tree)),
        None => (other(primary_metric), String::new()),
    };

    // run summary and tables are optional: a partially copied result
    // directory still renders what it can
    let result = output::read_result_json(&paths.result_json()).ok();
    let (metadata, annotations) = tables::read_metadata(&paths.metadata()).unwrap_or_else(|e| {
        warn!("no metadata table ({}); sample table will be empty", e);
        (Vec::new(), HashMap::new())
    });

    let mut genes_in_order: Vec<String> = Vec::new();
    // sample -> (genes, max trimmed length)
    let mut samples: IndexMap<String, (Vec<String>, usize)> = IndexMap::new();
    for row in &metadata {
        if !genes_in_order.contains(&row.gene) {
            genes_in_order.push(row.gene.clone());
        }
        let entry = samples.entry(row.sample.clone()).or_default();
        if !entry.0.contains(&row.gene) {
            entry.0.push(row.gene.clone());
        }
        entry.1 = entry.1.max(row.trimmed_length);
    }

    let sample_rows: Vec<SampleRow> = samples
        .into_iter()
        .map(|(sample, (genes, length))| {
            let annotation = annotations.get(&sample);
            SampleRow {
                genes: genes.join(", "),
                length: length.to_string(),
                species: annotation
                    .map(|a| {
                        if a.sciname.is_empty() {
                            a.accession.clone()
                        } else {
                            format!("{} ({})", a.sciname, a.accession)
                        }
                    })
                    .unwrap_or_else(|| "-".to_string()),
                identity: annotation
                    .map(|a| format!("{:.1}%", a.pident))
                    .unwrap_or_else(|| "-".to_string()),
                sample,
            }
        })
        .collect();

    let stages: Vec<StageRow> = result
        .as_ref()
        .map(|r| {
            r.stages
                .iter()
                .map(|s| StageRow {
                    name: s.stage.clone(),
                    status: s.status.to_string(),
                    duration: s
                        .duration
                        .map(|d| format!("{:.1}s", d.as_secs_f64()))
                        .unwrap_or_else(|| "-".to_string()),
                    detail: s
                        .output
                        .clone()
                        .or_else(|| s.error.clone())
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    let missing = read_missing(&paths.missing_samples());
    let bad_seqs = read_bad_seqs(&paths.bad_seqs());

    let concat_stage = result
        .as_ref()
        .and_then(|r| r.get_stage("concat").cloned());
    let msa_shape = concat_stage.and_then(|s| {
        match (s.metadata.get("columns"), s.metadata.get("rows")) {
            (Some(columns), Some(rows)) => Some(format!("{}x{}", columns, rows)),
            _ => None,
        }
    });

    debug!(
        "report context: {} samples, {} stages",
        sample_rows.len(),
        stages.len()
    );

    Ok(ReportContext {
        run_id: result
            .as_ref()
            .map(|r| r.run_id.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        seed: result
            .as_ref()
            .map(|r| r.seed.to_string())
            .unwrap_or_else(|| "-".to_string()),
        generated: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        genes: if genes_in_order.is_empty() {
            config.genes.join(", ")
        } else {
            genes_in_order.join(", ")
        },
        msa_algo: config.msa.algo.to_string(),
        gblocks_preset: config.gblocks.preset.as_str().to_string(),
        bootstrap: config.raxml.bootstrap.to_string(),
        metric: primary_metric.as_str().to_string(),
        other_metric: other_metric.as_str().to_string(),
        msa_shape,
        has_both_metrics: !other_tree_svg.is_empty(),
        tree_svg,
        other_tree_svg,
        stages,
        samples: sample_rows,
        missing,
        bad_seqs,
    })
}

type TreeLoad = (SupportMetric, Tree, Option<(SupportMetric, Tree)>);

/// Load the preferred support tree, falling back to the other metric,
/// and the secondary tree when both exist.
fn load_trees(paths: &RunPaths, preferred: SupportMetric) -> Result<TreeLoad> {
    let fallback = other(preferred);
    let load = |metric: SupportMetric| -> Option<Tree> {
        let path = paths.tree_file(metric.as_str());
        let text = std::fs::read_to_string(&path).ok()?;
        match Tree::parse(&text) {
            Ok(tree) => Some(tree),
            Err(e) => {
                warn!("unreadable tree {}: {}", path.display(), e);
                None
            }
        }
    };

    match (load(preferred), load(fallback)) {
        (Some(tree), Some(other_tree)) => {
            Ok((preferred, tree, Some((fallback, other_tree))))
        }
        (Some(tree), None) => Ok((preferred, tree, None)),
        (None, Some(tree)) => Ok((fallback, tree, None)),
        (None, None) => Err(ReportError::NoTree {
            dir: paths.root().to_path_buf(),
        }),
    }
}

fn other(metric: SupportMetric) -> SupportMetric {
    match metric {
        SupportMetric::Tbe => SupportMetric::Fbp,
        SupportMetric::Fbp => SupportMetric::Tbe,
    }
}

fn read_missing(path: &Path) -> Vec<MissingRow> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let (gene, samples) = line.split_once('\t')?;
            (samples != "None").then(|| MissingRow {
                gene: gene.to_string(),
                samples: samples.to_string(),
            })
        })
        .collect()
}

fn read_bad_seqs(path: &Path) -> Vec<BadSeqDisplayRow> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            (fields.len() >= 4).then(|| BadSeqDisplayRow {
                sample: fields[0].to_string(),
                gene: fields[1].to_string(),
                file: fields[2].to_string(),
                reason: fields[3].to_string(),
            })
        })
        .collect()
}
