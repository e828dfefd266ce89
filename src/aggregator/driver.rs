//! Shard registry, reference dispatch, and the end-of-trace merge.
//!
//! The driver owns every `ShardAccumulator`, keyed by shard (thread) id.
//! Serially it dispatches one reference at a time, creating shards lazily.
//! In parallel mode each shard's stream is processed by its own worker
//! thread; the registry mutex is held only for the insert-if-absent claim and
//! the final hand-back, so the hot path runs lock-free on a worker-owned
//! accumulator.
//!
//! `finalize` consumes the driver (the type system forbids dispatch after the
//! merge), sums every healthy shard into one aggregate view, and surfaces
//! failed shards separately; their data is excluded from the merge.

use crate::engine::recency::TagCounts;
use crate::engine::shard::{InstDistanceState, ShardAccumulator, ShardSnapshot};
use crate::parser::record::{MemoryReference, ShardKey};
use crate::utils::config::AnalyzerConfig;
use crate::utils::error::{ConfigError, EngineError};
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Result of a finished run: aggregate view, per-shard views, failures
#[derive(Debug)]
pub struct RunOutcome {
    /// Merged view over all healthy shards (same shape as a shard snapshot)
    pub aggregate: ShardSnapshot,

    /// Healthy shard snapshots, descending by total references
    pub shards: Vec<ShardSnapshot>,

    /// Shards that recorded an error, with their messages
    pub failures: Vec<(ShardKey, String)>,
}

impl RunOutcome {
    /// True when every shard finished without recording an error
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns the shard set and drives accumulation and merging
#[derive(Debug)]
pub struct Driver {
    cfg: AnalyzerConfig,
    shards: BTreeMap<ShardKey, ShardAccumulator>,
}

impl Driver {
    pub fn new(cfg: AnalyzerConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            shards: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.cfg
    }

    /// Number of shards seen so far
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Route one reference to its shard, creating the shard on first sight
    pub fn dispatch(&mut self, r: &MemoryReference) {
        let cfg = &self.cfg;
        self.shards
            .entry(r.shard)
            .or_insert_with(|| {
                debug!("creating shard {}", r.shard);
                ShardAccumulator::new(r.shard, cfg)
            })
            .update(r);
    }

    /// Process pre-partitioned per-shard streams on worker threads.
    ///
    /// Each stream must preserve its shard's original trace order; streams for
    /// distinct shards carry no ordering relative to each other. Claiming the
    /// same shard key twice is an error.
    pub fn run_parallel(
        cfg: AnalyzerConfig,
        streams: &[(ShardKey, Vec<MemoryReference>)],
    ) -> Result<Self, EngineError> {
        cfg.validate()?;

        let registry: Mutex<BTreeMap<ShardKey, Option<ShardAccumulator>>> =
            Mutex::new(BTreeMap::new());

        std::thread::scope(|scope| -> Result<(), EngineError> {
            let mut handles = Vec::with_capacity(streams.len());
            for (key, stream) in streams {
                let registry = &registry;
                let cfg = &cfg;
                handles.push(scope.spawn(move || -> Result<(), EngineError> {
                    // Insert-if-absent claim; the only lock on this path.
                    {
                        let mut reg = registry.lock().expect("shard registry poisoned");
                        if reg.contains_key(key) {
                            return Err(EngineError::DuplicateShard(*key));
                        }
                        reg.insert(*key, None);
                    }

                    let mut acc = ShardAccumulator::new(*key, cfg);
                    for r in stream {
                        acc.update(r);
                    }

                    registry
                        .lock()
                        .expect("shard registry poisoned")
                        .insert(*key, Some(acc));
                    Ok(())
                }));
            }
            for handle in handles {
                handle.join().expect("shard worker panicked")?;
            }
            Ok(())
        })?;

        let shards = registry
            .into_inner()
            .expect("shard registry poisoned")
            .into_iter()
            .filter_map(|(key, slot)| slot.map(|acc| (key, acc)))
            .collect();

        Ok(Self { cfg, shards })
    }

    /// Merge all shards into the aggregate view and freeze the results.
    ///
    /// Runs after every shard has finished (parallel workers have joined by
    /// the time the driver is handed back). Single-threaded; linear in total
    /// distinct tags plus histogram entries.
    pub fn finalize(self) -> RunOutcome {
        info!("merging {} shard(s)", self.shards.len());

        let mut aggregate = ShardSnapshot {
            shard: None,
            total_refs: 0,
            ignored_refs: 0,
            unique_tags: 0,
            unique_lines: 0,
            dist_map: BTreeMap::new(),
            tags: Vec::new(),
            inst: InstDistanceState::default(),
        };
        let mut merged_tags: BTreeMap<u64, TagCounts> = BTreeMap::new();
        let mut snapshots = Vec::new();
        let mut failures = Vec::new();

        for (key, acc) in self.shards {
            acc.log_verify_summary();
            if let Some(err) = acc.error() {
                failures.push((key, err.to_string()));
                continue;
            }
            let snap = acc.snapshot();

            aggregate.total_refs += snap.total_refs;
            aggregate.ignored_refs += snap.ignored_refs;
            // Unique tags sum per shard; unique lines deduplicate across the
            // merged tag table below.
            aggregate.unique_tags += snap.unique_tags;
            for (&dist, &count) in &snap.dist_map {
                *aggregate.dist_map.entry(dist).or_insert(0) += count;
            }
            for tc in &snap.tags {
                let entry = merged_tags.entry(tc.tag).or_insert(TagCounts {
                    tag: tc.tag,
                    total_refs: 0,
                    distant_refs: 0,
                });
                entry.total_refs += tc.total_refs;
                entry.distant_refs += tc.distant_refs;
            }
            aggregate.inst.merge(&snap.inst);

            snapshots.push(snap);
        }

        aggregate.unique_lines = merged_tags.len() as u64;
        aggregate.tags = merged_tags.into_values().collect();

        // Per-shard reports go out in descending total_refs order.
        snapshots.sort_by(|l, r| r.total_refs.cmp(&l.total_refs));

        if !failures.is_empty() {
            info!(
                "{} shard(s) failed and were excluded from the aggregate",
                failures.len()
            );
        }

        RunOutcome {
            aggregate,
            shards: snapshots,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::record::AccessKind;

    fn test_config() -> AnalyzerConfig {
        AnalyzerConfig {
            line_size: 1,
            ..Default::default()
        }
    }

    fn instr(shard: ShardKey, addr: u64) -> MemoryReference {
        MemoryReference::instr(shard, addr, 4)
    }

    #[test]
    fn test_dispatch_creates_shards_lazily() {
        let mut driver = Driver::new(test_config()).unwrap();
        driver.dispatch(&instr(1, 0xa));
        driver.dispatch(&instr(2, 0xb));
        driver.dispatch(&instr(1, 0xa));
        assert_eq!(driver.shard_count(), 2);
    }

    #[test]
    fn test_finalize_sums_counters() {
        let mut driver = Driver::new(test_config()).unwrap();
        for &(shard, addr) in &[(1, 0xa), (1, 0xb), (1, 0xa), (2, 0xa), (2, 0xa)] {
            driver.dispatch(&instr(shard, addr));
        }
        let outcome = driver.finalize();
        assert!(outcome.is_clean());
        assert_eq!(outcome.aggregate.total_refs, 5);
        // Unique tags sum per shard: 2 + 1.
        assert_eq!(outcome.aggregate.unique_tags, 3);
        // Unique lines deduplicate: {a, b}.
        assert_eq!(outcome.aggregate.unique_lines, 2);
        // Tag a: 2 refs on shard 1 + 2 on shard 2.
        let a = outcome.aggregate.tags.iter().find(|t| t.tag == 0xa).unwrap();
        assert_eq!(a.total_refs, 4);
    }

    #[test]
    fn test_merge_matches_single_shard_run() {
        // The same per-shard sequences analyzed as two shards and as one
        // shard (in an order-preserving interleaving) must merge to identical
        // histograms and tag tables.
        let shard1 = [0xa, 0xb, 0xa, 0xc, 0xa];
        let shard2 = [0x10, 0x11, 0x10, 0x10];

        let mut split = Driver::new(test_config()).unwrap();
        for &addr in &shard1 {
            split.dispatch(&instr(1, addr));
        }
        for &addr in &shard2 {
            split.dispatch(&instr(2, addr));
        }
        let split_outcome = split.finalize();

        let mut merged = Driver::new(test_config()).unwrap();
        // Interleave while preserving each shard's internal order. Shards
        // stay distinct keys: the merge itself is what is being tested.
        let mut iter1 = shard1.iter();
        let mut iter2 = shard2.iter();
        loop {
            match (iter1.next(), iter2.next()) {
                (None, None) => break,
                (a, b) => {
                    if let Some(&addr) = a {
                        merged.dispatch(&instr(1, addr));
                    }
                    if let Some(&addr) = b {
                        merged.dispatch(&instr(2, addr));
                    }
                }
            }
        }
        let merged_outcome = merged.finalize();

        assert_eq!(
            split_outcome.aggregate.dist_map,
            merged_outcome.aggregate.dist_map
        );
        assert_eq!(split_outcome.aggregate.tags, merged_outcome.aggregate.tags);
        assert_eq!(
            split_outcome.aggregate.total_refs,
            merged_outcome.aggregate.total_refs
        );
    }

    #[test]
    fn test_parallel_matches_serial() {
        let streams: Vec<(ShardKey, Vec<MemoryReference>)> = (0..4u64)
            .map(|shard| {
                let refs = (0..100u64)
                    .map(|i| instr(shard, (i % 17) * 64 + shard))
                    .collect();
                (shard, refs)
            })
            .collect();

        let mut serial = Driver::new(test_config()).unwrap();
        for (_, stream) in &streams {
            for r in stream {
                serial.dispatch(r);
            }
        }
        let serial_outcome = serial.finalize();

        let parallel = Driver::run_parallel(test_config(), &streams).unwrap();
        let parallel_outcome = parallel.finalize();

        assert_eq!(
            serial_outcome.aggregate.dist_map,
            parallel_outcome.aggregate.dist_map
        );
        assert_eq!(
            serial_outcome.aggregate.total_refs,
            parallel_outcome.aggregate.total_refs
        );
        assert_eq!(
            serial_outcome.aggregate.tags,
            parallel_outcome.aggregate.tags
        );
    }

    #[test]
    fn test_duplicate_shard_stream_rejected() {
        let streams = vec![
            (1u64, vec![instr(1, 0xa)]),
            (1u64, vec![instr(1, 0xb)]),
        ];
        let result = Driver::run_parallel(test_config(), &streams);
        assert!(matches!(result, Err(EngineError::DuplicateShard(1))));
    }

    #[test]
    fn test_failed_shard_excluded_from_aggregate() {
        let mut driver = Driver::new(test_config()).unwrap();
        driver.dispatch(&instr(1, 0xa));
        driver.dispatch(&instr(2, 0xb));
        // Shard 2 violates the protocol: reference after its exit marker.
        driver.dispatch(&MemoryReference {
            addr: 0,
            size: 0,
            kind: AccessKind::ThreadExit,
            shard: 2,
        });
        driver.dispatch(&instr(2, 0xc));

        let outcome = driver.finalize();
        assert!(!outcome.is_clean());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, 2);
        // Only shard 1 contributes.
        assert_eq!(outcome.aggregate.total_refs, 1);
        assert_eq!(outcome.shards.len(), 1);
    }

    #[test]
    fn test_shards_reported_in_descending_total_refs() {
        let mut driver = Driver::new(test_config()).unwrap();
        driver.dispatch(&instr(1, 0xa));
        for _ in 0..3 {
            driver.dispatch(&instr(2, 0xb));
        }
        let outcome = driver.finalize();
        assert_eq!(outcome.shards[0].shard, Some(2));
        assert_eq!(outcome.shards[1].shard, Some(1));
    }
}
