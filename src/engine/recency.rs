//! Recency-ordered address tracker with stack-distance queries.
//!
//! Tracks every distinct tag a shard has referenced, ordered front-to-back by
//! how recently each was touched. A repeat touch reports the tag's stack
//! distance: the number of distinct tags referenced since its previous access
//! (0 for an immediate repeat), then relocates the tag to the front.
//!
//! Nodes live by value in a `Vec` arena and link to each other by index, so
//! the list carries no ownership of its own; the tag index maps into the same
//! arena. Nodes are never removed until the shard is dropped.
//!
//! Distance modes:
//! - exact (`skip_distance == 0`): walk from the node to the front, counting.
//! - approximate (`skip_distance = S > 0`): a gate node is pinned at depth S.
//!   Nodes in front of the gate are counted exactly (at most S steps); nodes
//!   behind it are estimated as `S + (gate_stamp - node_stamp)` from the
//!   per-touch stamps. The estimate never undershoots the true distance.
//! - verify (`verify` flag): runs both computations per repeat access and
//!   tallies the drift; for calibration runs only.

use log::warn;
use std::collections::HashMap;

/// Arena index sentinel for "no node"
const NIL: u32 = u32::MAX;

/// Per-tag reference counters, also the merge/report currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagCounts {
    /// Cache-line tag (address right-shifted by the line bits)
    pub tag: u64,
    /// Total references to this tag
    pub total_refs: u64,
    /// References whose stack distance exceeded the threshold
    pub distant_refs: u64,
}

/// Drift tally produced by verify mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyStats {
    /// Repeat accesses checked
    pub checks: u64,
    /// Checks where the estimate differed from the exact distance
    pub mismatches: u64,
    /// Cumulative estimate overshoot across all mismatches
    pub total_overshoot: u64,
}

#[derive(Debug)]
struct Node {
    tag: u64,
    /// Neighbor toward the front (NIL at the head)
    prev: u32,
    /// Neighbor toward the back (NIL at the tail)
    next: u32,
    /// Stamp of the most recent touch; strictly decreasing front to back
    stamp: u64,
    total_refs: u64,
    distant_refs: u64,
}

/// Recency order over all distinct tags seen by one shard
#[derive(Debug)]
pub struct RecencyList {
    nodes: Vec<Node>,
    index: HashMap<u64, u32>,
    head: u32,
    tail: u32,
    /// Node at depth exactly `skip_distance`; NIL until the list grows past
    /// the horizon, always NIL in exact mode
    gate: u32,
    /// Stamp source, bumped once per touch
    clock: u64,
    distance_threshold: u64,
    skip_distance: u64,
    verify: bool,
    verify_stats: VerifyStats,
}

impl RecencyList {
    pub fn new(distance_threshold: u64, skip_distance: u64, verify: bool) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            gate: NIL,
            clock: 0,
            distance_threshold,
            skip_distance,
            verify,
            verify_stats: VerifyStats::default(),
        }
    }

    /// Number of distinct tags tracked
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record one access to `tag`.
    ///
    /// Returns `None` the first time a tag is seen, `Some(distance)` on every
    /// repeat. Counters on the tag's node are updated either way.
    pub fn touch(&mut self, tag: u64) -> Option<u64> {
        self.clock += 1;
        match self.index.get(&tag) {
            Some(&idx) => {
                let dist = self.distance_of(idx);
                let node = &mut self.nodes[idx as usize];
                node.total_refs += 1;
                if dist > self.distance_threshold {
                    node.distant_refs += 1;
                }
                self.relocate_to_front(idx);
                self.nodes[idx as usize].stamp = self.clock;
                Some(dist)
            }
            None => {
                self.insert_front(tag);
                None
            }
        }
    }

    /// Counters for one tag, if it has been seen
    pub fn counts(&self, tag: u64) -> Option<TagCounts> {
        self.index.get(&tag).map(|&idx| {
            let node = &self.nodes[idx as usize];
            TagCounts {
                tag: node.tag,
                total_refs: node.total_refs,
                distant_refs: node.distant_refs,
            }
        })
    }

    /// All tracked tags with their counters, in arena (first-seen) order
    pub fn entries(&self) -> impl Iterator<Item = TagCounts> + '_ {
        self.nodes.iter().map(|node| TagCounts {
            tag: node.tag,
            total_refs: node.total_refs,
            distant_refs: node.distant_refs,
        })
    }

    /// Drift tally accumulated in verify mode
    pub fn verify_stats(&self) -> VerifyStats {
        self.verify_stats
    }

    /// Log the verify tally, if verify mode saw any repeat accesses
    pub fn log_verify_summary(&self, shard: u64) {
        if !self.verify || self.verify_stats.checks == 0 {
            return;
        }
        let vs = &self.verify_stats;
        if vs.mismatches > 0 {
            warn!(
                "shard {}: skip-distance estimate drifted on {}/{} repeat accesses \
                 (mean overshoot {:.2})",
                shard,
                vs.mismatches,
                vs.checks,
                vs.total_overshoot as f64 / vs.mismatches as f64
            );
        }
    }

    /// Stack distance of the node at `idx`, per the configured mode
    fn distance_of(&mut self, idx: u32) -> u64 {
        if idx == self.head {
            return 0;
        }
        if self.skip_distance == 0 {
            return self.exact_depth(idx);
        }

        let behind_gate = self.gate != NIL
            && self.nodes[idx as usize].stamp < self.nodes[self.gate as usize].stamp;
        let dist = if behind_gate {
            // Stamps between the gate and the node count accesses, not
            // distinct tags, so this can only overshoot.
            self.skip_distance
                + (self.nodes[self.gate as usize].stamp - self.nodes[idx as usize].stamp)
        } else {
            // At most skip_distance steps to the front.
            self.exact_depth(idx)
        };

        if self.verify && behind_gate {
            let exact = self.exact_depth(idx);
            self.verify_stats.checks += 1;
            if dist != exact {
                self.verify_stats.mismatches += 1;
                self.verify_stats.total_overshoot += dist - exact;
            }
        } else if self.verify {
            self.verify_stats.checks += 1;
        }

        dist
    }

    /// Walk from `idx` to the head, counting steps (the node's 0-based depth)
    fn exact_depth(&self, idx: u32) -> u64 {
        let mut depth = 0u64;
        let mut cur = self.nodes[idx as usize].prev;
        while cur != NIL {
            depth += 1;
            cur = self.nodes[cur as usize].prev;
        }
        depth
    }

    fn insert_front(&mut self, tag: u64) {
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node {
            tag,
            prev: NIL,
            next: self.head,
            stamp: self.clock,
            total_refs: 1,
            distant_refs: 0,
        });
        if self.head != NIL {
            self.nodes[self.head as usize].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
        self.index.insert(tag, idx);

        if self.skip_distance > 0 {
            if self.gate != NIL {
                // Everything behind the new head got one deeper.
                self.gate = self.nodes[self.gate as usize].prev;
            } else if self.nodes.len() as u64 == self.skip_distance + 1 {
                // The list just reached the horizon: the tail sits at depth
                // skip_distance.
                self.gate = self.tail;
            }
        }
    }

    fn relocate_to_front(&mut self, idx: u32) {
        if idx == self.head {
            return;
        }

        // Moving a node from at-or-behind the gate shifts everything in front
        // of the gate one deeper.
        if self.gate != NIL
            && self.nodes[idx as usize].stamp <= self.nodes[self.gate as usize].stamp
        {
            self.gate = self.nodes[self.gate as usize].prev;
        }

        // Unlink.
        let (prev, next) = {
            let node = &self.nodes[idx as usize];
            (node.prev, node.next)
        };
        if prev != NIL {
            self.nodes[prev as usize].next = next;
        }
        if next != NIL {
            self.nodes[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }

        // Relink at the front.
        self.nodes[idx as usize].prev = NIL;
        self.nodes[idx as usize].next = self.head;
        self.nodes[self.head as usize].prev = idx;
        self.head = idx;
    }
}
