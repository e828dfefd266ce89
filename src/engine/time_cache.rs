//! Bounded LRU cache of last-seen instruction clock values.
//!
//! Backs the instruction-distance measure: maps a tag to the clock value of
//! its previous access, evicting least-recently-inserted entries once the
//! size passes `capacity + elasticity` (pruning back down to `capacity`).
//! Reads do not refresh an entry; the insert that follows a read does.
//!
//! Same arena/index layout as the recency list, but entries here are evicted
//! and their slots recycled.

use std::collections::HashMap;

const NIL: u32 = u32::MAX;

#[derive(Debug)]
struct Slot {
    tag: u64,
    value: u64,
    prev: u32,
    next: u32,
}

/// LRU map from tag to last instruction clock value
#[derive(Debug)]
pub struct TimeCache {
    slots: Vec<Slot>,
    index: HashMap<u64, u32>,
    head: u32,
    tail: u32,
    free: Vec<u32>,
    capacity: usize,
    elasticity: usize,
}

impl TimeCache {
    /// `capacity == 0` disables eviction entirely
    pub fn new(capacity: usize, elasticity: usize) -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            free: Vec::new(),
            capacity,
            elasticity,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Look up the stored clock value without refreshing the entry
    pub fn get(&self, tag: u64) -> Option<u64> {
        self.index.get(&tag).map(|&idx| self.slots[idx as usize].value)
    }

    pub fn contains(&self, tag: u64) -> bool {
        self.index.contains_key(&tag)
    }

    /// Insert or refresh `tag`, moving it to the front of the eviction order
    pub fn insert(&mut self, tag: u64, value: u64) {
        if let Some(&idx) = self.index.get(&tag) {
            self.slots[idx as usize].value = value;
            self.move_to_front(idx);
            return;
        }

        let idx = match self.free.pop() {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                slot.tag = tag;
                slot.value = value;
                slot.prev = NIL;
                slot.next = NIL;
                idx
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(Slot {
                    tag,
                    value,
                    prev: NIL,
                    next: NIL,
                });
                idx
            }
        };
        self.link_front(idx);
        self.index.insert(tag, idx);
        self.prune();
    }

    /// Evict from the back until the size is within capacity again
    fn prune(&mut self) {
        if self.capacity == 0 || self.index.len() < self.capacity + self.elasticity {
            return;
        }
        while self.index.len() > self.capacity {
            let victim = self.tail;
            debug_assert_ne!(victim, NIL);
            self.unlink(victim);
            let tag = self.slots[victim as usize].tag;
            self.index.remove(&tag);
            self.free.push(victim);
        }
    }

    fn move_to_front(&mut self, idx: u32) {
        if idx == self.head {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }

    fn link_front(&mut self, idx: u32) {
        self.slots[idx as usize].prev = NIL;
        self.slots[idx as usize].next = self.head;
        if self.head != NIL {
            self.slots[self.head as usize].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
    }

    fn unlink(&mut self, idx: u32) {
        let (prev, next) = {
            let slot = &self.slots[idx as usize];
            (slot.prev, slot.next)
        };
        if prev != NIL {
            self.slots[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
    }
}
