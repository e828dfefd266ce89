//! Derive summary statistics from distance histograms and tag tables.
//!
//! All functions here are pure: they read a frozen `ShardSnapshot` (or the
//! merged aggregate, which has the same shape) and never touch live engine
//! state. Zero-sample inputs produce well-defined empty statistics instead of
//! dividing by zero.

use crate::engine::recency::TagCounts;
use crate::engine::shard::InstDistanceState;
use log::debug;
use std::collections::BTreeMap;

/// Summary statistics over a stack-distance histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceStats {
    /// Repeat accesses the histogram covers
    pub count: u64,

    /// Sum of all recorded distances
    pub sum: u128,

    /// Mean distance (0.0 when empty)
    pub mean: f64,

    /// Smallest distance at which the cumulative count reaches half the total
    pub median: u64,

    /// Population standard deviation (0.0 when empty)
    pub stddev: f64,
}

impl DistanceStats {
    pub fn empty() -> Self {
        Self {
            count: 0,
            sum: 0,
            mean: 0.0,
            median: 0,
            stddev: 0.0,
        }
    }
}

/// Compute mean, median and standard deviation from a distance histogram
///
/// **Public** - used for both per-shard and aggregate reporting
pub fn distance_stats(dist_map: &BTreeMap<u64, u64>) -> DistanceStats {
    let count: u64 = dist_map.values().sum();
    if count == 0 {
        return DistanceStats::empty();
    }

    let sum: u128 = dist_map
        .iter()
        .map(|(&d, &c)| d as u128 * c as u128)
        .sum();
    let mean = sum as f64 / count as f64;

    let mut sum_sq_diff = 0.0f64;
    let mut cumulative = 0u64;
    let mut median = 0u64;
    let mut have_median = false;
    for (&d, &c) in dist_map {
        let diff = d as f64 - mean;
        sum_sq_diff += diff * diff * c as f64;
        if !have_median {
            cumulative += c;
            if cumulative * 2 >= count {
                median = d;
                have_median = true;
            }
        }
    }
    let stddev = (sum_sq_diff / count as f64).sqrt();

    debug!(
        "distance stats: n={} mean={:.2} median={} stddev={:.2}",
        count, mean, median, stddev
    );

    DistanceStats {
        count,
        sum,
        mean,
        median,
        stddev,
    }
}

/// One row of the rendered distance histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramRow {
    pub distance: u64,
    pub count: u64,
    pub percent: f64,
    pub cumulative_percent: f64,
}

/// Expand a distance histogram into rows with percent and cumulative percent
pub fn histogram_rows(dist_map: &BTreeMap<u64, u64>) -> Vec<HistogramRow> {
    let total: u64 = dist_map.values().sum();
    if total == 0 {
        return Vec::new();
    }
    let mut cumulative = 0.0f64;
    dist_map
        .iter()
        .map(|(&distance, &count)| {
            let percent = count as f64 / total as f64 * 100.0;
            cumulative += percent;
            HistogramRow {
                distance,
                count,
                percent,
                cumulative_percent: cumulative,
            }
        })
        .collect()
}

/// Top `n` tags by total references; ties broken by distant references
/// (descending), then by tag (ascending)
pub fn top_by_total_refs(tags: &[TagCounts], n: usize) -> Vec<TagCounts> {
    let mut sorted = tags.to_vec();
    sorted.sort_unstable_by(|l, r| {
        r.total_refs
            .cmp(&l.total_refs)
            .then(r.distant_refs.cmp(&l.distant_refs))
            .then(l.tag.cmp(&r.tag))
    });
    sorted.truncate(n);
    sorted
}

/// Top `n` tags by distant references; ties broken by total references
/// (descending), then by tag (ascending)
pub fn top_by_distant_refs(tags: &[TagCounts], n: usize) -> Vec<TagCounts> {
    let mut sorted = tags.to_vec();
    sorted.sort_unstable_by(|l, r| {
        r.distant_refs
            .cmp(&l.distant_refs)
            .then(r.total_refs.cmp(&l.total_refs))
            .then(l.tag.cmp(&r.tag))
    });
    sorted.truncate(n);
    sorted
}

/// Mean and standard deviation of the instruction-distance measure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstDistanceStats {
    pub mean: f64,
    pub stddev: f64,
}

/// Derive instruction-distance statistics from the running sums
pub fn inst_distance_stats(inst: &InstDistanceState) -> InstDistanceStats {
    if inst.reused_refs == 0 {
        return InstDistanceStats {
            mean: 0.0,
            stddev: 0.0,
        };
    }
    let n = inst.reused_refs as f64;
    let mean = inst.sum as f64 / n;
    let variance = (inst.sum_sq as f64 / n - mean * mean).max(0.0);
    InstDistanceStats {
        mean,
        stddev: variance.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(u64, u64)]) -> BTreeMap<u64, u64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_distance_stats_scenario() {
        // Distances 2, 2, 1 from the A,B,C,A,B,A trace.
        let stats = distance_stats(&map(&[(1, 1), (2, 2)]));
        assert_eq!(stats.count, 3);
        assert_eq!(stats.sum, 5);
        assert!((stats.mean - 5.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.median, 2);
    }

    #[test]
    fn test_distance_stats_empty() {
        let stats = distance_stats(&BTreeMap::new());
        assert_eq!(stats, DistanceStats::empty());
    }

    #[test]
    fn test_distance_stats_single_value() {
        let stats = distance_stats(&map(&[(7, 4)]));
        assert_eq!(stats.mean, 7.0);
        assert_eq!(stats.median, 7);
        assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn test_median_even_count_takes_lower() {
        // 1,1,5,5: cumulative hits half the total at distance 1.
        let stats = distance_stats(&map(&[(1, 2), (5, 2)]));
        assert_eq!(stats.median, 1);
        assert_eq!(stats.mean, 3.0);
    }

    #[test]
    fn test_histogram_rows_percentages() {
        let rows = histogram_rows(&map(&[(1, 1), (2, 3)]));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].distance, 1);
        assert!((rows[0].percent - 25.0).abs() < 1e-9);
        assert!((rows[1].cumulative_percent - 100.0).abs() < 1e-9);
    }

    fn tag(tag: u64, total: u64, distant: u64) -> TagCounts {
        TagCounts {
            tag,
            total_refs: total,
            distant_refs: distant,
        }
    }

    #[test]
    fn test_top_by_total_refs_scenario() {
        // A=3, B=2, C=1 from the end-to-end scenario.
        let tags = vec![tag(0xc, 1, 0), tag(0xa, 3, 1), tag(0xb, 2, 1)];
        let top = top_by_total_refs(&tags, 3);
        assert_eq!(top[0].tag, 0xa);
        assert_eq!(top[1].tag, 0xb);
        assert_eq!(top[2].tag, 0xc);
    }

    #[test]
    fn test_top_by_total_refs_tie_breaking() {
        let tags = vec![tag(0x2, 5, 1), tag(0x1, 5, 2), tag(0x3, 5, 1)];
        let top = top_by_total_refs(&tags, 3);
        // Equal totals: more distant refs first, then lower tag.
        assert_eq!(top[0].tag, 0x1);
        assert_eq!(top[1].tag, 0x2);
        assert_eq!(top[2].tag, 0x3);
    }

    #[test]
    fn test_top_by_distant_refs_tie_breaking() {
        let tags = vec![tag(0x2, 4, 3), tag(0x1, 9, 3), tag(0x3, 9, 1)];
        let top = top_by_distant_refs(&tags, 2);
        assert_eq!(top[0].tag, 0x1);
        assert_eq!(top[1].tag, 0x2);
    }

    #[test]
    fn test_top_truncates() {
        let tags = vec![tag(1, 1, 0), tag(2, 2, 0), tag(3, 3, 0)];
        assert_eq!(top_by_total_refs(&tags, 2).len(), 2);
    }

    #[test]
    fn test_inst_distance_stats() {
        let mut inst = InstDistanceState::default();
        // Distances 2 and 4.
        inst.reused_refs = 2;
        inst.sum = 6;
        inst.sum_sq = 20;
        let stats = inst_distance_stats(&inst);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.stddev, 1.0);
    }

    #[test]
    fn test_inst_distance_stats_empty() {
        let stats = inst_distance_stats(&InstDistanceState::default());
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.stddev, 0.0);
    }
}
