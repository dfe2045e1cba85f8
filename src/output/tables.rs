// ABOUTME: TSV writers for the run's tabular side-products
// ABOUTME: metadata.tsv, bad_seqs.tsv, and missing_samples.tsv

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::error::{OutputError, Result};

/// A species annotation attached to a sample by the BLAST stage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Annotation {
    pub accession: String,
    pub sciname: String,
    pub pident: f64,
}

/// One row of metadata.tsv: a surviving record in the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRow {
    pub sample: String,
    pub gene: String,
    pub file: String,
    pub well: Option<String>,
    pub is_reverse: bool,
    pub is_reference: bool,
    pub trimmed_length: usize,
}

/// One row of bad_seqs.tsv: a record dropped during quality trimming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadSeqRow {
    pub sample: String,
    pub gene: String,
    pub file: String,
    pub reason: String,
}

fn write_tsv(path: &Path, content: String) -> Result<()> {
    std::fs::write(path, content).map_err(|source| OutputError::WriteError {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_metadata(
    path: &Path,
    rows: &[MetadataRow],
    annotations: &HashMap<String, Annotation>,
) -> Result<()> {
    let mut out = String::from(
        "sample\tgene\tfile\twell\tdirection\treference\ttrimmed_length\taccession\tspecies\tpident\n",
    );
    for row in rows {
        let annotation = annotations.get(&row.sample);
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            row.sample,
            row.gene,
            row.file,
            row.well.as_deref().unwrap_or("-"),
            if row.is_reverse { "rev" } else { "fwd" },
            if row.is_reference { "yes" } else { "no" },
            row.trimmed_length,
            annotation.map(|a| a.accession.as_str()).unwrap_or("-"),
            annotation.map(|a| a.sciname.as_str()).unwrap_or("-"),
            annotation
                .map(|a| format!("{:.1}", a.pident))
                .unwrap_or_else(|| "-".to_string()),
        ));
    }
    write_tsv(path, out)
}

pub fn write_bad_seqs(path: &Path, rows: &[BadSeqRow]) -> Result<()> {
    let mut out = String::from("sample\tgene\tfile\treason\n");
    for row in rows {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            row.sample, row.gene, row.file, row.reason
        ));
    }
    write_tsv(path, out)
}

/// The original's shape: one line per gene, missing samples joined
/// with commas, literal `None` when the gene is complete.
pub fn write_missing_samples(path: &Path, missing: &IndexMap<String, Vec<String>>) -> Result<()> {
    let mut out = String::from("gene\tmissing samples\n");
    for (gene, samples) in missing {
        let joined = if samples.is_empty() {
            "None".to_string()
        } else {
            samples.join(", ")
        };
        out.push_str(&format!("{}\t{}\n", gene, joined));
    }
    write_tsv(path, out)
}

/// Read metadata.tsv back; `visualize` rebuilds the report from it.
pub fn read_metadata(path: &Path) -> Result<(Vec<MetadataRow>, HashMap<String, Annotation>)> {
    let content = std::fs::read_to_string(path).map_err(|source| OutputError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rows = Vec::new();
    let mut annotations = HashMap::new();

    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 10 {
            continue;
        }
        rows.push(MetadataRow {
            sample: fields[0].to_string(),
            gene: fields[1].to_string(),
            file: fields[2].to_string(),
            well: (fields[3] != "-").then(|| fields[3].to_string()),
            is_reverse: fields[4] == "rev",
            is_reference: fields[5] == "yes",
            trimmed_length: fields[6].parse().unwrap_or(0),
        });
        if fields[7] != "-" {
            annotations.insert(
                fields[0].to_string(),
                Annotation {
                    accession: fields[7].to_string(),
                    sciname: fields[8].to_string(),
                    pident: fields[9].parse().unwrap_or(0.0),
                },
            );
        }
    }
    Ok((rows, annotations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_row() -> MetadataRow {
        MetadataRow {
            sample: "D15_A01".to_string(),
            gene: "ITS".to_string(),
            file: "D15_ITS_A01.ab1".to_string(),
            well: Some("A01".to_string()),
            is_reverse: false,
            is_reference: false,
            trimmed_length: 512,
        }
    }

    #[test]
    fn test_metadata_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.tsv");

        let mut annotations = HashMap::new();
        annotations.insert(
            "D15_A01".to_string(),
            Annotation {
                accession: "MH855322.1".to_string(),
                sciname: "Fusarium oxysporum".to_string(),
                pident: 99.2,
            },
        );
        write_metadata(&path, &[sample_row()], &annotations).unwrap();

        let (rows, read_annotations) = read_metadata(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sample, "D15_A01");
        assert_eq!(rows[0].trimmed_length, 512);
        assert_eq!(
            read_annotations["D15_A01"].sciname,
            "Fusarium oxysporum".to_string()
        );
    }

    #[test]
    fn test_missing_samples_uses_none_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing_samples.tsv");

        let mut missing = IndexMap::new();
        missing.insert("ITS".to_string(), vec![]);
        missing.insert(
            "OPA10".to_string(),
            vec!["D15_A01".to_string(), "D15_B02".to_string()],
        );
        write_missing_samples(&path, &missing).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("ITS\tNone"));
        assert!(text.contains("OPA10\tD15_A01, D15_B02"));
    }

    #[test]
    fn test_bad_seqs_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad_seqs.tsv");

        write_bad_seqs(
            &path,
            &[BadSeqRow {
                sample: "D15_C03".to_string(),
                gene: "ITS".to_string(),
                file: "D15_ITS_C03.ab1".to_string(),
                reason: "no high-quality window".to_string(),
            }],
        )
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("sample\tgene\tfile\treason\n"));
        assert!(text.contains("no high-quality window"));
    }
}
