//! Reuse Trace
//!
//! Offline reuse-distance (stack distance) analysis for recorded memory
//! reference traces: how many distinct addresses a program touches between
//! two successive references to the same address, the standard technique for
//! approximating LRU miss rates at arbitrary cache sizes without
//! resimulating the cache.
//!
//! This crate provides the core implementation for the `reuse-trace` CLI
//! tool.
//!
//! ## Getting Started
//!
//! Most users should install and use the CLI:
//!
//! ```bash
//! cargo install reuse-trace
//! reuse-trace --help
//! ```

pub mod aggregator;
pub mod commands;
pub mod engine;
pub mod output;
pub mod parser;
pub mod utils;
