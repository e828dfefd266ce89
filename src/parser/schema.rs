//! Output JSON schema definitions for analysis reports.
//!
//! This module defines the structure of report files we write to disk.
//! Schema is versioned to allow future evolution.

use serde::{Deserialize, Serialize};

/// Top-level report structure written to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Schema version for compatibility checking
    pub version: String,

    /// Timestamp when the report was generated (ISO 8601)
    pub generated_at: String,

    /// Knobs the analysis ran with
    pub config: ConfigSection,

    /// Merged view over all healthy shards
    pub aggregate: ShardSection,

    /// Per-shard views, descending by total references
    pub shards: Vec<ShardSection>,

    /// Shards excluded from the aggregate because they recorded an error
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_shards: Vec<FailedShard>,
}

/// Configuration echo, so a report is self-describing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSection {
    pub line_size: u64,
    pub distance_threshold: u64,
    pub skip_list_distance: u64,
    pub report_top: usize,
}

/// Statistics for one shard, or for the merged aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardSection {
    /// Shard (thread) id; absent for the aggregate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<u64>,

    /// Qualifying instruction references
    pub total_refs: u64,

    /// References excluded by kind
    pub ignored_refs: u64,

    /// Distinct tags (summed per shard in the aggregate)
    pub unique_tags: u64,

    /// Distinct cache lines (deduplicated in the aggregate)
    pub unique_lines: u64,

    /// Stack-distance summary statistics
    pub distance: DistanceSection,

    /// Full per-distance histogram, present only when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histogram: Option<Vec<HistogramRowSection>>,

    /// Top cache lines by total references
    pub top_by_total_refs: Vec<TopLineSection>,

    /// Top cache lines by distant references
    pub top_by_distant_refs: Vec<TopLineSection>,

    /// The coarser instruction-distance table
    pub instruction_distance: InstDistanceSection,
}

/// Mean/median/stddev block for stack distances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceSection {
    /// Repeat accesses covered
    pub count: u64,
    pub sum: f64,
    pub mean: f64,
    pub median: u64,
    pub stddev: f64,
}

/// One row of the full distance histogram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramRowSection {
    pub distance: u64,
    pub count: u64,
    pub percent: f64,
    pub cumulative_percent: f64,
}

/// One row of a top-address table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopLineSection {
    /// Cache line address, hex with 0x prefix
    pub line: String,
    pub total_refs: u64,
    pub distant_refs: u64,
}

/// Instruction-distance (time-distance) section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstDistanceSection {
    /// Non-empty log2 buckets; `hi` is absent for the overflow bucket
    pub buckets: Vec<InstBucketSection>,

    /// Instructions seen exactly once
    pub first_seen: u64,

    /// Reused instruction references
    pub reused_refs: u64,

    /// Total qualifying instruction references
    pub total_instructions: u64,

    pub mean: f64,
    pub stddev: f64,
}

/// One log2 bucket `[lo, hi)` of the instruction-distance table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstBucketSection {
    pub lo: u64,

    /// Exclusive upper bound; absent means unbounded (overflow bucket)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hi: Option<u64>,

    pub count: u64,
}

/// A shard excluded from the aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedShard {
    pub shard: u64,
    pub error: String,
}
