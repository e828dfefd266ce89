//! Trace input and report schema definitions.
//!
//! This module handles:
//! - Decoded memory reference records
//! - Streaming the line-oriented trace text format
//! - Defining the versioned report JSON schema

pub mod record;
pub mod schema;
pub mod trace;

// Re-export main types
pub use record::{AccessKind, MemoryReference, ShardKey};
pub use schema::Report;
pub use trace::{TraceHeader, TraceReader};
