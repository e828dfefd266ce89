//! The reuse-distance engine: recency tracking, per-shard accumulation, and
//! the instruction-distance time cache.
//!
//! Everything in this module is thread-confined; the aggregator is the only
//! place shards meet.

pub mod recency;
pub mod shard;
pub mod time_cache;

// Re-export main types
pub use recency::{RecencyList, TagCounts, VerifyStats};
pub use shard::{inst_bucket_index, InstDistanceState, ShardAccumulator, ShardSnapshot};
pub use time_cache::TimeCache;
