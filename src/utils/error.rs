//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use thiserror::Error;

/// Errors caused by invalid or inconsistent analyzer configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("line size must be a non-zero power of two, got {0}")]
    BadLineSize(u64),

    #[error("report_top must be greater than 0")]
    TopCountZero,

    #[error("inconsistent {knob} across inputs: {first} vs {second}")]
    InconsistentInputs {
        knob: &'static str,
        first: u64,
        second: u64,
    },
}

/// Errors that can occur while parsing a trace file
#[derive(Error, Debug)]
pub enum TraceParseError {
    #[error("IO error reading trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: malformed record: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("line {line}: unrecognized access kind '{kind}'")]
    UnknownKind { line: u64, kind: char },

    #[error("line {line}: bad header directive: {reason}")]
    BadDirective { line: u64, reason: String },
}

/// Errors raised by the reuse-distance engine itself
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("shard {0} claimed by more than one worker")]
    DuplicateShard(u64),
}

/// Errors that can occur during report output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("invalid output path: {0}")]
    InvalidPath(String),
}
