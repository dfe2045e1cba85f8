// ABOUTME: Trace and sequence handling for the treeline pipeline
// ABOUTME: Provides ABI trace reading, FASTA I/O, and quality trimming

pub mod abif;
pub mod error;
pub mod quality;
pub mod record;

pub use abif::read_trace;
pub use error::{Result, TraceError};
pub use quality::{mark_bad_stretches, trim_ends, EndRatio};
pub use record::{read_fasta, write_fasta, SeqRecord};
