// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Builds ABIF trace fixtures, plate CSVs, and fake tool scripts

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use treeline::cli::Config;

/// A sandboxed input/output layout for one test run.
pub struct TestEnvironment {
    pub dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    pub fn abi_dir(&self) -> PathBuf {
        let path = self.dir.path().join("traces");
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn results_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    /// A config pointing at the sandbox, BLAST off so no tests reach
    /// for the network.
    pub fn config(&self, genes: &[&str]) -> Config {
        let mut config = Config::default();
        config.abi_dir = Some(self.abi_dir());
        config.output_dir = self.results_dir();
        config.genes = genes.iter().map(|g| g.to_string()).collect();
        config.blast.enabled = false;
        config.seed = Some(7);
        config
    }

    /// Write a synthetic ABI trace under the trace directory.
    pub fn write_trace(&self, name: &str, seq: &[u8], quals: &[u8]) -> PathBuf {
        let path = self.abi_dir().join(name);
        std::fs::write(&path, build_abif(seq, quals)).unwrap();
        path
    }

    pub fn write_plate_csv(&self, plate: &str, prefix: &str) -> PathBuf {
        let csv_dir = self.dir.path().join("plates");
        std::fs::create_dir_all(&csv_dir).unwrap();
        let path = csv_dir.join(format!("{}.csv", plate));
        let grid: Vec<String> = (0..8)
            .map(|row| {
                (0..12)
                    .map(|col| format!("{}_{}{}", prefix, (b'A' + row) as char, col + 1))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect();
        std::fs::write(&path, grid.join("\n")).unwrap();
        path
    }
}

/// Minimal ABIF container with PBAS (bases) and PCON (phreds) tags,
/// enough for the trace reader.
pub fn build_abif(seq: &[u8], quals: &[u8]) -> Vec<u8> {
    const ENTRY_SIZE: usize = 28;
    let data_start = 6 + ENTRY_SIZE;

    let mut data = Vec::new();
    let mut entries = Vec::new();
    for (name, payload) in [(b"PBAS", seq), (b"PCON", quals)] {
        entries.push((name, payload.len(), data_start + data.len()));
        data.extend_from_slice(payload);
    }
    let dir_offset = data_start + data.len();

    let mut out = Vec::new();
    out.extend_from_slice(b"ABIF");
    out.extend_from_slice(&101u16.to_be_bytes());
    out.extend_from_slice(b"tdir");
    out.extend_from_slice(&1i32.to_be_bytes());
    out.extend_from_slice(&1023i16.to_be_bytes());
    out.extend_from_slice(&(ENTRY_SIZE as i16).to_be_bytes());
    out.extend_from_slice(&(entries.len() as i32).to_be_bytes());
    out.extend_from_slice(&((entries.len() * ENTRY_SIZE) as i32).to_be_bytes());
    out.extend_from_slice(&(dir_offset as i32).to_be_bytes());
    out.extend_from_slice(&0i32.to_be_bytes());

    out.extend_from_slice(&data);
    for (name, size, offset) in entries {
        out.extend_from_slice(name);
        out.extend_from_slice(&2i32.to_be_bytes());
        out.extend_from_slice(&1i16.to_be_bytes());
        out.extend_from_slice(&1i16.to_be_bytes());
        out.extend_from_slice(&(size as i32).to_be_bytes());
        out.extend_from_slice(&(size as i32).to_be_bytes());
        if size <= 4 {
            // short payloads live inline in the offset field
            let mut inline = [0u8; 4];
            inline[..size].copy_from_slice(&out[offset..offset + size].to_vec());
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(offset as i32).to_be_bytes());
        }
        out.extend_from_slice(&0i32.to_be_bytes());
    }
    out
}

/// Drop a fake executable into a directory that can stand in for an
/// external tool on PATH.
pub fn write_fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
