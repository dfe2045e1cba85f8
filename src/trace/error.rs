// ABOUTME: Error types for trace reading and sequence quality operations
// ABOUTME: Covers ABIF container defects, FASTA parsing, and trim rejections

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Not an ABIF file: {path} (bad magic)")]
    BadMagic { path: PathBuf },

    #[error("Truncated ABIF container: {path} ({context})")]
    Truncated { path: PathBuf, context: String },

    #[error("ABIF tag missing: {tag} in {path}")]
    MissingTag { tag: String, path: PathBuf },

    #[error("Base calls and quality scores differ in length: {path} ({bases} bases, {quals} scores)")]
    LengthMismatch {
        path: PathBuf,
        bases: usize,
        quals: usize,
    },

    #[error("Invalid FASTA in {path}: {reason}")]
    InvalidFasta { path: PathBuf, reason: String },

    #[error("No window of {of} bases with {good} phred >= {min_phred} found")]
    NoGoodWindow { good: usize, of: usize, min_phred: u8 },

    #[error("Record has no quality scores")]
    NoQualities,

    #[error("Invalid end ratio '{input}': expected <good>/<of> with good <= of")]
    InvalidEndRatio { input: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TraceError>;
