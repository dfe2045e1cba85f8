// ABOUTME: Sample metadata layer: trace discovery, naming, and plate lookups
// ABOUTME: Resolves raw trace files into gene/sample records for the pipeline

pub mod error;
pub mod naming;
pub mod plates;
pub mod registry;

pub use error::{Result, SampleError};
pub use naming::{NamingRules, TraceName, Well};
pub use plates::PlateBook;
pub use registry::{SampleRecord, SampleRegistry};
