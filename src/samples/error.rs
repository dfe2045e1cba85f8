// ABOUTME: Error types for sample discovery and metadata resolution
// ABOUTME: Covers naming rules, plate layout files, and registry assembly

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Invalid trace pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Trace pattern must capture 'gene' and either 'sample' or 'plate'+'well': {pattern}")]
    MissingCaptures { pattern: String },

    #[error("Invalid well coordinate: {well}")]
    InvalidWell { well: String },

    #[error("Plate layout not found for plate '{plate}' (needed by {trace})")]
    PlateNotFound { plate: String, trace: PathBuf },

    #[error("Malformed plate layout {path} (row {row}): {reason}")]
    MalformedPlate {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("Well {well} is not on plate '{plate}'")]
    WellOffPlate { plate: String, well: String },

    #[error("Duplicate gene in configuration: {gene}")]
    DuplicateGene { gene: String },

    #[error("Duplicate reference file: {path}")]
    DuplicateReference { path: PathBuf },

    #[error("No reference file matches gene '{gene}'")]
    UnmatchedGene { gene: String },

    #[error("Trace directory is not set; pass --abi-dir or set abi_dir in the config")]
    NoTraceDir,

    #[error("No trace files found under {dir}")]
    NoTraces { dir: PathBuf },

    #[error("No genes configured and none could be inferred from trace names")]
    NoGenes,

    #[error("Whitelist file {path} is empty")]
    EmptyWhitelist { path: PathBuf },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SampleError>;
