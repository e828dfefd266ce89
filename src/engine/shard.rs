//! Per-shard statistics accumulator.
//!
//! One accumulator owns everything a single shard (thread) of the trace
//! produces: the recency list for stack distances, the exact distance
//! histogram, and the bounded time cache backing the coarser
//! instruction-distance measure. Accumulators are thread-confined; the
//! aggregator hands each one to exactly one worker.

use crate::engine::recency::{RecencyList, TagCounts, VerifyStats};
use crate::engine::time_cache::TimeCache;
use crate::parser::record::{AccessKind, MemoryReference, ShardKey};
use crate::utils::config::{AnalyzerConfig, INST_DIST_BUCKETS};
use log::trace;
use std::collections::BTreeMap;

/// Instruction-distance accumulators (time-distance, not stack-distance).
///
/// `buckets[i]` for `i < INST_DIST_BUCKETS` counts reuses with distance in
/// `[2^i, 2^(i+1))`; `buckets[INST_DIST_BUCKETS]` is the overflow bucket and
/// the final slot counts instructions seen for the first time.
#[derive(Debug, Clone)]
pub struct InstDistanceState {
    pub buckets: [u64; INST_DIST_BUCKETS + 2],
    /// Sum of all reuse distances (u128: billions of samples must not wrap)
    pub sum: u128,
    /// Sum of squared reuse distances
    pub sum_sq: u128,
    /// Reused (non-first-seen) instruction references
    pub reused_refs: u64,
    /// Total qualifying instruction references
    pub total_instructions: u64,
}

impl Default for InstDistanceState {
    fn default() -> Self {
        Self {
            buckets: [0; INST_DIST_BUCKETS + 2],
            sum: 0,
            sum_sq: 0,
            reused_refs: 0,
            total_instructions: 0,
        }
    }
}

impl InstDistanceState {
    /// First-seen (never reused) instruction count
    pub fn first_seen(&self) -> u64 {
        self.buckets[INST_DIST_BUCKETS + 1]
    }

    /// Sum another shard's accumulators into this one
    pub fn merge(&mut self, other: &InstDistanceState) {
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *mine += theirs;
        }
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.reused_refs += other.reused_refs;
        self.total_instructions += other.total_instructions;
    }
}

/// Log2 bucket index for an instruction distance.
///
/// The measure never produces 0 (the clock advances before every lookup); a
/// 0 input lands in the `[1,2)` bucket.
pub fn inst_bucket_index(distance: u64) -> usize {
    (distance.max(1).ilog2() as usize).min(INST_DIST_BUCKETS)
}

/// Frozen copy of one shard's statistics, also the shape of the merged
/// aggregate view
#[derive(Debug, Clone)]
pub struct ShardSnapshot {
    /// Source shard key; `None` for the merged aggregate
    pub shard: Option<ShardKey>,
    /// Qualifying (instruction) references processed
    pub total_refs: u64,
    /// References excluded by kind (loads, stores)
    pub ignored_refs: u64,
    /// Distinct tags; for the aggregate this is the sum over shards
    pub unique_tags: u64,
    /// Distinct cache lines; for the aggregate, distinct across all shards
    pub unique_lines: u64,
    /// Exact stack-distance histogram: distance -> occurrence count
    pub dist_map: BTreeMap<u64, u64>,
    /// Per-tag counters for the top-address tables
    pub tags: Vec<TagCounts>,
    /// Instruction-distance accumulators
    pub inst: InstDistanceState,
}

/// Statistics accumulator for one shard of the reference stream
#[derive(Debug)]
pub struct ShardAccumulator {
    shard: ShardKey,
    line_bits: u32,
    recency: RecencyList,
    dist_map: BTreeMap<u64, u64>,
    total_refs: u64,
    ignored_refs: u64,
    /// Monotonic count of qualifying instruction references
    clock: u64,
    time_cache: TimeCache,
    inst: InstDistanceState,
    exited: bool,
    error: Option<String>,
}

impl ShardAccumulator {
    pub fn new(shard: ShardKey, cfg: &AnalyzerConfig) -> Self {
        Self {
            shard,
            line_bits: cfg.line_size_bits(),
            recency: RecencyList::new(
                cfg.distance_threshold,
                cfg.skip_list_distance,
                cfg.verify_skip,
            ),
            dist_map: BTreeMap::new(),
            total_refs: 0,
            ignored_refs: 0,
            clock: 0,
            time_cache: TimeCache::new(cfg.time_cache_capacity, cfg.time_cache_elasticity),
            inst: InstDistanceState::default(),
            exited: false,
            error: None,
        }
    }

    pub fn shard_key(&self) -> ShardKey {
        self.shard
    }

    pub fn total_refs(&self) -> u64 {
        self.total_refs
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Mark the shard failed; all further input for it is dropped
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    /// Drift tally from the recency list's verify mode
    pub fn verify_stats(&self) -> VerifyStats {
        self.recency.verify_stats()
    }

    /// Log the verify summary for this shard, if applicable
    pub fn log_verify_summary(&self) {
        self.recency.log_verify_summary(self.shard);
    }

    /// Consume one reference. Never fails: non-qualifying kinds are counted
    /// as ignored and a failed shard silently drops input.
    pub fn update(&mut self, r: &MemoryReference) {
        if self.error.is_some() {
            return;
        }
        match r.kind {
            AccessKind::ThreadExit => {
                self.exited = true;
            }
            AccessKind::Load | AccessKind::Store => {
                self.ignored_refs += 1;
            }
            AccessKind::InstrFetch => {
                if self.exited {
                    self.fail("reference delivered after end-of-stream marker");
                    return;
                }
                self.total_refs += 1;
                self.clock += 1;
                let tag = r.addr >> self.line_bits;

                if let Some(dist) = self.recency.touch(tag) {
                    trace!("shard {}: tag {:#x} distance {}", self.shard, tag, dist);
                    *self.dist_map.entry(dist).or_insert(0) += 1;
                }

                self.inst.total_instructions += 1;
                if let Some(prev) = self.time_cache.get(tag) {
                    let delta = self.clock - prev;
                    self.inst.sum += delta as u128;
                    self.inst.sum_sq += (delta as u128) * (delta as u128);
                    self.inst.buckets[inst_bucket_index(delta)] += 1;
                    self.inst.reused_refs += 1;
                } else {
                    self.inst.buckets[INST_DIST_BUCKETS + 1] += 1;
                }
                self.time_cache.insert(tag, self.clock);
            }
        }
    }

    /// Freeze the shard's state for merging and reporting
    pub fn snapshot(&self) -> ShardSnapshot {
        ShardSnapshot {
            shard: Some(self.shard),
            total_refs: self.total_refs,
            ignored_refs: self.ignored_refs,
            unique_tags: self.recency.len() as u64,
            unique_lines: self.recency.len() as u64,
            dist_map: self.dist_map.clone(),
            tags: self.recency.entries().collect(),
            inst: self.inst.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AnalyzerConfig {
        AnalyzerConfig {
            line_size: 1,
            distance_threshold: 1,
            ..Default::default()
        }
    }

    fn feed(acc: &mut ShardAccumulator, addrs: &[u64]) {
        for &addr in addrs {
            acc.update(&MemoryReference::instr(acc.shard_key(), addr, 4));
        }
    }

    #[test]
    fn test_end_to_end_scenario() {
        // A,B,C,A,B,A with line_size=1.
        let mut acc = ShardAccumulator::new(1, &test_config());
        feed(&mut acc, &[0xa, 0xb, 0xc, 0xa, 0xb, 0xa]);

        let snap = acc.snapshot();
        assert_eq!(snap.total_refs, 6);
        assert_eq!(snap.unique_tags, 3);
        // Distances 2, 2, 1.
        assert_eq!(snap.dist_map.get(&2), Some(&2));
        assert_eq!(snap.dist_map.get(&1), Some(&1));
        assert_eq!(snap.dist_map.values().sum::<u64>(), 3);
        // threshold 1: A's distance-2 repeat is distant, its distance-1 is not.
        let a = snap.tags.iter().find(|t| t.tag == 0xa).unwrap();
        assert_eq!(a.total_refs, 3);
        assert_eq!(a.distant_refs, 1);
    }

    #[test]
    fn test_loads_and_stores_ignored() {
        let mut acc = ShardAccumulator::new(1, &test_config());
        acc.update(&MemoryReference {
            addr: 0x10,
            size: 8,
            kind: AccessKind::Load,
            shard: 1,
        });
        acc.update(&MemoryReference {
            addr: 0x10,
            size: 8,
            kind: AccessKind::Store,
            shard: 1,
        });
        acc.update(&MemoryReference::instr(1, 0x10, 4));

        let snap = acc.snapshot();
        assert_eq!(snap.total_refs, 1);
        assert_eq!(snap.ignored_refs, 2);
        assert_eq!(snap.unique_tags, 1);
    }

    #[test]
    fn test_line_coalescing() {
        let cfg = AnalyzerConfig {
            line_size: 64,
            ..Default::default()
        };
        let mut acc = ShardAccumulator::new(1, &cfg);
        // Same 64-byte line: tag collapses, second access is distance 0.
        feed(&mut acc, &[0x1000, 0x1010]);
        let snap = acc.snapshot();
        assert_eq!(snap.unique_lines, 1);
        assert_eq!(snap.dist_map.get(&0), Some(&1));
    }

    #[test]
    fn test_reference_after_exit_fails_shard() {
        let mut acc = ShardAccumulator::new(1, &test_config());
        feed(&mut acc, &[0xa]);
        acc.update(&MemoryReference::thread_exit(1));
        acc.update(&MemoryReference::instr(1, 0xb, 4));
        assert!(acc.has_failed());
        // The offending reference and everything after it is dropped.
        acc.update(&MemoryReference::instr(1, 0xc, 4));
        assert_eq!(acc.snapshot().total_refs, 1);
    }

    #[test]
    fn test_instruction_distance_tracking() {
        let mut acc = ShardAccumulator::new(1, &test_config());
        // Clocks: A=1, B=2, A=3 (delta 2), C=4, A=5 (delta 2).
        feed(&mut acc, &[0xa, 0xb, 0xa, 0xc, 0xa]);
        let snap = acc.snapshot();
        assert_eq!(snap.inst.total_instructions, 5);
        assert_eq!(snap.inst.reused_refs, 2);
        assert_eq!(snap.inst.first_seen(), 3);
        assert_eq!(snap.inst.sum, 4);
        assert_eq!(snap.inst.sum_sq, 8);
        // Both deltas are 2: bucket [2,4).
        assert_eq!(snap.inst.buckets[1], 2);
    }

    #[test]
    fn test_inst_bucket_boundaries() {
        assert_eq!(inst_bucket_index(1), 0); // [1,2)
        assert_eq!(inst_bucket_index(2), 1); // [2,4)
        assert_eq!(inst_bucket_index(3), 1); // [2,4)
        assert_eq!(inst_bucket_index(4), 2); // [4,8)
        assert_eq!(inst_bucket_index(0), 0); // shares [1,2)
        assert_eq!(inst_bucket_index(u64::MAX), INST_DIST_BUCKETS);
    }

    #[test]
    fn test_clock_counts_qualifying_refs_only() {
        let mut acc = ShardAccumulator::new(1, &test_config());
        acc.update(&MemoryReference {
            addr: 0x10,
            size: 8,
            kind: AccessKind::Load,
            shard: 1,
        });
        feed(&mut acc, &[0xa, 0xa]);
        // The load did not advance the clock: delta is exactly 1.
        assert_eq!(acc.snapshot().inst.sum, 1);
    }
}
