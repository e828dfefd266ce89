//! Shard aggregation: dispatch, end-of-trace merge, and summary statistics.
//!
//! This module turns accumulated shard state into:
//! - One merged aggregate view (per-bucket and per-tag summation)
//! - Mean/median/stddev distance statistics
//! - Top-address rankings for the report tables

pub mod driver;
pub mod metrics;

// Re-export main types and functions
pub use driver::{Driver, RunOutcome};
pub use metrics::{
    distance_stats, histogram_rows, inst_distance_stats, top_by_distant_refs, top_by_total_refs,
    DistanceStats, HistogramRow, InstDistanceStats,
};
