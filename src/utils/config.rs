//! Configuration knobs and constants for the analyzer.
//!
//! These mirror the tuning surface of the reuse-distance engine: cache line
//! granularity, the "distant reference" threshold, the approximate-distance
//! horizon, and reporting options.

use crate::utils::error::ConfigError;

/// Current report schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Number of power-of-two buckets in the instruction-distance table.
///
/// Bucket `i < INST_DIST_BUCKETS` covers `[2^i, 2^(i+1))`; index
/// `INST_DIST_BUCKETS` is the overflow bucket and `INST_DIST_BUCKETS + 1`
/// counts first-seen (never-reused) instructions.
pub const INST_DIST_BUCKETS: usize = 40;

/// Default cache line size in bytes
pub const DEFAULT_LINE_SIZE: u64 = 64;

/// Default stack-distance cutoff marking a "distant" re-reference
pub const DEFAULT_DISTANCE_THRESHOLD: u64 = 100;

/// Default number of rows in the top-address tables
pub const DEFAULT_REPORT_TOP: usize = 10;

/// Default maximum entries in the per-shard instruction-distance cache
pub const DEFAULT_TIME_CACHE_CAPACITY: usize = 1 << 20;

/// Default pruning watermark beyond the capacity
pub const DEFAULT_TIME_CACHE_ELASTICITY: usize = 1000;

/// Tuning knobs for one analysis run.
///
/// **Public** - constructed from CLI arguments in main.rs
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Cache line size in bytes (power of two); addresses are coalesced to
    /// lines by dropping `log2(line_size)` low bits. 1 disables coalescing.
    pub line_size: u64,

    /// Stack distances above this count as "distant" re-references
    pub distance_threshold: u64,

    /// Approximate-mode horizon; 0 means exact distances everywhere
    pub skip_list_distance: u64,

    /// Run exact and approximate distance side by side and report drift
    pub verify_skip: bool,

    /// Emit the full per-distance histogram table
    pub report_histogram: bool,

    /// Number of rows in the top-address tables
    pub report_top: usize,

    /// Maximum entries in each shard's instruction-distance cache
    pub time_cache_capacity: usize,

    /// Entries past capacity tolerated before pruning back down
    pub time_cache_elasticity: usize,

    /// Stop after this many references (None = whole trace)
    pub max_refs: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            line_size: DEFAULT_LINE_SIZE,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            skip_list_distance: 0,
            verify_skip: false,
            report_histogram: false,
            report_top: DEFAULT_REPORT_TOP,
            time_cache_capacity: DEFAULT_TIME_CACHE_CAPACITY,
            time_cache_elasticity: DEFAULT_TIME_CACHE_ELASTICITY,
            max_refs: None,
        }
    }
}

impl AnalyzerConfig {
    /// Validate knob combinations that cannot be expressed in the type system.
    ///
    /// **Public** - called once before the run starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.line_size == 0 || !self.line_size.is_power_of_two() {
            return Err(ConfigError::BadLineSize(self.line_size));
        }
        if self.report_top == 0 {
            return Err(ConfigError::TopCountZero);
        }
        Ok(())
    }

    /// Number of low address bits dropped when coalescing to cache lines
    pub fn line_size_bits(&self) -> u32 {
        // validate() guarantees a non-zero power of two
        self.line_size.trailing_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AnalyzerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_line_size_must_be_power_of_two() {
        let cfg = AnalyzerConfig {
            line_size: 48,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_line_size_zero_rejected() {
        let cfg = AnalyzerConfig {
            line_size: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_line_size_bits() {
        let cfg = AnalyzerConfig {
            line_size: 64,
            ..Default::default()
        };
        assert_eq!(cfg.line_size_bits(), 6);

        let cfg = AnalyzerConfig {
            line_size: 1,
            ..Default::default()
        };
        assert_eq!(cfg.line_size_bits(), 0);
    }

    #[test]
    fn test_report_top_zero_rejected() {
        let cfg = AnalyzerConfig {
            report_top: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
