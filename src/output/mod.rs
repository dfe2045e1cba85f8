// ABOUTME: Tabular artifacts and run summary output
// ABOUTME: Writes the TSV side-products and the pipeline result JSON

pub mod error;
pub mod summary;
pub mod tables;

pub use error::{OutputError, Result};
pub use summary::{read_result_json, write_result_json};
pub use tables::{Annotation, BadSeqRow, MetadataRow};
