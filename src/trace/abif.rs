// ABOUTME: Minimal ABIF (.ab1) container reader for sequencer trace files
// ABOUTME: Extracts called bases (PBAS) and per-base phred scores (PCON)

use std::path::Path;

use tracing::debug;

use super::error::{Result, TraceError};
use super::record::SeqRecord;

// ABIF directory entries are 28 bytes; the header entry sits right
// after the 4-byte magic and 2-byte version.
const MAGIC: &[u8; 4] = b"ABIF";
const ENTRY_SIZE: usize = 28;
const HEADER_ENTRY_OFFSET: usize = 6;

#[derive(Debug, Clone)]
struct DirEntry {
    name: [u8; 4],
    number: i32,
    num_elements: i32,
    data_size: i32,
    data_offset: i32,
}

/// Read an ABI trace file into a sequence record. The record ID is the
/// file stem; base calls come from the PBAS tag and quality scores from
/// PCON, preferring tag number 2 (the basecaller copy) over 1.
pub fn read_trace(path: &Path) -> Result<SeqRecord> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < HEADER_ENTRY_OFFSET + ENTRY_SIZE || &bytes[..4] != MAGIC {
        return Err(TraceError::BadMagic {
            path: path.to_path_buf(),
        });
    }

    let header = parse_entry(&bytes, HEADER_ENTRY_OFFSET, path)?;
    let dir_count = header.num_elements as usize;
    let dir_offset = header.data_offset as usize;

    let mut entries = Vec::with_capacity(dir_count);
    for i in 0..dir_count {
        entries.push(parse_entry(&bytes, dir_offset + i * ENTRY_SIZE, path)?);
    }
    debug!("{}: {} ABIF directory entries", path.display(), entries.len());

    let seq = tag_data(&bytes, &entries, b"PBAS", path)?;
    let quals = tag_data(&bytes, &entries, b"PCON", path)?;

    if seq.len() != quals.len() {
        return Err(TraceError::LengthMismatch {
            path: path.to_path_buf(),
            bases: seq.len(),
            quals: quals.len(),
        });
    }

    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(SeqRecord::with_quals(id, seq, quals))
}

fn parse_entry(bytes: &[u8], offset: usize, path: &Path) -> Result<DirEntry> {
    let slice = bytes
        .get(offset..offset + ENTRY_SIZE)
        .ok_or_else(|| TraceError::Truncated {
            path: path.to_path_buf(),
            context: format!("directory entry at offset {}", offset),
        })?;

    let mut name = [0u8; 4];
    name.copy_from_slice(&slice[0..4]);
    Ok(DirEntry {
        name,
        number: i32::from_be_bytes([slice[4], slice[5], slice[6], slice[7]]),
        num_elements: i32::from_be_bytes([slice[12], slice[13], slice[14], slice[15]]),
        data_size: i32::from_be_bytes([slice[16], slice[17], slice[18], slice[19]]),
        data_offset: i32::from_be_bytes([slice[20], slice[21], slice[22], slice[23]]),
    })
}

/// Fetch the payload of a tag. Payloads of four bytes or fewer live
/// inline in the offset field of the entry itself.
fn tag_data(bytes: &[u8], entries: &[DirEntry], tag: &[u8; 4], path: &Path) -> Result<Vec<u8>> {
    let entry = entries
        .iter()
        .filter(|e| &e.name == tag)
        .min_by_key(|e| match e.number {
            2 => 0,
            n => n.unsigned_abs() + 1,
        })
        .ok_or_else(|| TraceError::MissingTag {
            tag: String::from_utf8_lossy(tag).into_owned(),
            path: path.to_path_buf(),
        })?;

    let size = entry.data_size as usize;
    if size <= 4 {
        let inline = entry.data_offset.to_be_bytes();
        return Ok(inline[..size].to_vec());
    }

    let offset = entry.data_offset as usize;
    bytes
        .get(offset..offset + size)
        .map(|s| s.to_vec())
        .ok_or_else(|| TraceError::Truncated {
            path: path.to_path_buf(),
            context: format!(
                "{} payload ({} bytes at offset {})",
                String::from_utf8_lossy(tag),
                size,
                offset
            ),
        })
}
