//! Decoded memory reference records.
//!
//! A trace is a per-shard-ordered stream of these records. The engine only
//! profiles instruction fetches; loads and stores are counted as ignored and
//! a thread-exit record marks end-of-stream for its shard.

use std::fmt;

/// Key identifying the shard (typically a thread id) a reference belongs to
pub type ShardKey = u64;

/// What kind of access a reference describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Instruction fetch - the only kind fed to the reuse-distance engine
    InstrFetch,
    /// Data load
    Load,
    /// Data store
    Store,
    /// End-of-stream marker for the shard
    ThreadExit,
}

impl AccessKind {
    /// Parse the single-letter kind code used in trace files
    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'I' | 'i' => Some(AccessKind::InstrFetch),
            'L' | 'l' => Some(AccessKind::Load),
            'S' | 's' => Some(AccessKind::Store),
            'X' | 'x' => Some(AccessKind::ThreadExit),
            _ => None,
        }
    }

    /// Single-letter code for trace files and log output
    pub fn code(&self) -> char {
        match self {
            AccessKind::InstrFetch => 'I',
            AccessKind::Load => 'L',
            AccessKind::Store => 'S',
            AccessKind::ThreadExit => 'X',
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessKind::InstrFetch => "instr-fetch",
            AccessKind::Load => "load",
            AccessKind::Store => "store",
            AccessKind::ThreadExit => "thread-exit",
        };
        write!(f, "{}", name)
    }
}

/// One decoded memory reference event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReference {
    /// Referenced virtual address
    pub addr: u64,

    /// Access size in bytes (0 for thread-exit markers)
    pub size: u16,

    /// Access kind
    pub kind: AccessKind,

    /// Shard (thread) the reference belongs to
    pub shard: ShardKey,
}

impl MemoryReference {
    /// Instruction fetch at `addr` on `shard`
    pub fn instr(shard: ShardKey, addr: u64, size: u16) -> Self {
        Self {
            addr,
            size,
            kind: AccessKind::InstrFetch,
            shard,
        }
    }

    /// End-of-stream marker for `shard`
    pub fn thread_exit(shard: ShardKey) -> Self {
        Self {
            addr: 0,
            size: 0,
            kind: AccessKind::ThreadExit,
            shard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_round_trip() {
        for kind in [
            AccessKind::InstrFetch,
            AccessKind::Load,
            AccessKind::Store,
            AccessKind::ThreadExit,
        ] {
            assert_eq!(AccessKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_kind_code() {
        assert_eq!(AccessKind::from_code('Q'), None);
    }

    #[test]
    fn test_lowercase_codes_accepted() {
        assert_eq!(AccessKind::from_code('i'), Some(AccessKind::InstrFetch));
        assert_eq!(AccessKind::from_code('x'), Some(AccessKind::ThreadExit));
    }
}
