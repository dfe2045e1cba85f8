// ABOUTME: Interactive HTML report and local preview server
// ABOUTME: Newick parsing, SVG tree layout, Handlebars rendering, axum serving

pub mod error;
pub mod html;
pub mod layout;
pub mod newick;
pub mod serve;
pub mod templates;

pub use error::{ReportError, Result};
pub use html::build_report;
pub use newick::Tree;
pub use serve::serve;
