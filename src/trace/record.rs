// ABOUTME: Sequence record type and FASTA reading/writing
// ABOUTME: The file-based hand-off format between pipeline stages

use std::fmt::Write as _;
use std::path::Path;

use super::error::{Result, TraceError};

const FASTA_WIDTH: usize = 80;

/// A named nucleotide sequence, optionally carrying per-base phred scores.
/// Trace-derived records have scores; references and alignment rows do not.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqRecord {
    pub id: String,
    pub seq: Vec<u8>,
    pub quals: Option<Vec<u8>>,
}

impl SeqRecord {
    pub fn new(id: impl Into<String>, seq: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            seq,
            quals: None,
        }
    }

    pub fn with_quals(id: impl Into<String>, seq: Vec<u8>, quals: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            seq,
            quals: Some(quals),
        }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Reverse-complement the sequence in place, reversing qualities alongside.
    /// IUPAC ambiguity codes are complemented; anything else maps to N.
    pub fn reverse_complement(&mut self) {
        self.seq.reverse();
        for base in self.seq.iter_mut() {
            *base = complement(*base);
        }
        if let Some(quals) = self.quals.as_mut() {
            quals.reverse();
        }
    }

    pub fn to_uppercase(&mut self) {
        self.seq.make_ascii_uppercase();
    }

    /// Render as wrapped FASTA.
    pub fn to_fasta(&self) -> String {
        let mut out = String::with_capacity(self.seq.len() + self.id.len() + 8);
        let _ = writeln!(out, ">{}", self.id);
        for chunk in self.seq.chunks(FASTA_WIDTH) {
            out.push_str(std::str::from_utf8(chunk).unwrap_or(""));
            out.push('\n');
        }
        out
    }
}

fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' | b'U' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'a' => b't',
        b't' | b'u' => b'a',
        b'c' => b'g',
        b'g' => b'c',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        b'S' => b'S',
        b'W' => b'W',
        b'-' => b'-',
        _ => b'N',
    }
}

/// Read all records from a FASTA file. Record IDs are the first
/// whitespace-delimited token of the header line.
pub fn read_fasta(path: &Path) -> Result<Vec<SeqRecord>> {
    let content = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    let mut current: Option<SeqRecord> = None;

    for line in content.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            if let Some(record) = current.take() {
                records.push(record);
            }
            let id = header
                .split_whitespace()
                .next()
                .ok_or_else(|| TraceError::InvalidFasta {
                    path: path.to_path_buf(),
                    reason: "empty header line".to_string(),
                })?;
            current = Some(SeqRecord::new(id, Vec::new()));
        } else {
            match current.as_mut() {
                Some(record) => record.seq.extend(line.bytes().filter(|b| !b.is_ascii_whitespace())),
                None => {
                    return Err(TraceError::InvalidFasta {
                        path: path.to_path_buf(),
                        reason: "sequence data before first header".to_string(),
                    });
                }
            }
        }
    }
    if let Some(record) = current {
        records.push(record);
    }

    if records.is_empty() {
        return Err(TraceError::InvalidFasta {
            path: path.to_path_buf(),
            reason: "no records found".to_string(),
        });
    }
    Ok(records)
}

/// Write records to a FASTA file, creating parent directories as needed.
pub fn write_fasta(path: &Path, records: &[SeqRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    for record in records {
        out.push_str(&record.to_fasta());
    }
    std::fs::write(path, out)?;
    Ok(())
}
