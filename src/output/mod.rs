//! Report rendering and output writers.
//!
//! This module handles turning a finished run into:
//! - The text report printed to stdout
//! - The versioned JSON report written to disk

pub mod json;
pub mod report;

// Re-export main functions
pub use json::{read_report, write_report};
pub use report::{build_report, render_text};
