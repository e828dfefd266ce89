//! Streaming parser for the line-oriented trace text format.
//!
//! Format, one record per line:
//!
//! ```text
//! # line_size=64            <- optional header directive
//! # anything else           <- comment
//! <shard> <kind> <addr> [size]
//! ```
//!
//! where `kind` is `I` (instruction fetch), `L` (load), `S` (store) or
//! `X` (thread exit, end-of-stream for the shard), `addr` is hex with a `0x`
//! prefix or decimal, and `size` defaults to 1. Records are in original trace
//! order within each shard.

use crate::parser::record::{AccessKind, MemoryReference};
use crate::utils::error::TraceParseError;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Header values declared by `# key=value` directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceHeader {
    /// Line size the trace was recorded for, if declared
    pub line_size: Option<u64>,
}

/// Streaming reader yielding one `MemoryReference` per trace record.
///
/// **Public** - the iterator yields `Err` for malformed lines; callers decide
/// whether to skip (the normal policy) or abort.
pub struct TraceReader<R> {
    reader: R,
    buf: String,
    line_no: u64,
    header: TraceHeader,
}

impl TraceReader<BufReader<File>> {
    /// Open a trace file for streaming
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TraceParseError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TraceReader<R> {
    /// Wrap any buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line_no: 0,
            header: TraceHeader::default(),
        }
    }

    /// Header directives seen so far (complete once iteration finishes)
    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    fn parse_directive(&mut self, text: &str) -> Result<(), TraceParseError> {
        let (key, value) = text.split_once('=').ok_or_else(|| {
            TraceParseError::BadDirective {
                line: self.line_no,
                reason: format!("expected key=value, got '{}'", text),
            }
        })?;
        match key.trim() {
            "line_size" => {
                let parsed = value.trim().parse::<u64>().map_err(|e| {
                    TraceParseError::BadDirective {
                        line: self.line_no,
                        reason: format!("line_size: {}", e),
                    }
                })?;
                debug!("trace header: line_size={}", parsed);
                self.header.line_size = Some(parsed);
            }
            // Unknown directives are tolerated for forward compatibility.
            other => debug!("ignoring unknown trace directive '{}'", other),
        }
        Ok(())
    }

    fn parse_record(&self, text: &str) -> Result<MemoryReference, TraceParseError> {
        let mut fields = text.split_whitespace();

        let shard = fields
            .next()
            .ok_or_else(|| self.malformed("missing shard field"))?
            .parse::<u64>()
            .map_err(|e| self.malformed(format!("shard: {}", e)))?;

        let kind_field = fields
            .next()
            .ok_or_else(|| self.malformed("missing kind field"))?;
        let kind_char = match kind_field.chars().next() {
            Some(c) if kind_field.len() == 1 => c,
            _ => return Err(self.malformed(format!("kind must be one letter, got '{}'", kind_field))),
        };
        let kind = AccessKind::from_code(kind_char).ok_or(TraceParseError::UnknownKind {
            line: self.line_no,
            kind: kind_char,
        })?;

        // Thread-exit markers carry no address or size.
        if kind == AccessKind::ThreadExit {
            return Ok(MemoryReference::thread_exit(shard));
        }

        let addr_field = fields
            .next()
            .ok_or_else(|| self.malformed("missing address field"))?;
        let addr = parse_addr(addr_field)
            .map_err(|reason| self.malformed(format!("address '{}': {}", addr_field, reason)))?;

        let size = match fields.next() {
            Some(s) => s
                .parse::<u16>()
                .map_err(|e| self.malformed(format!("size: {}", e)))?,
            None => 1,
        };

        Ok(MemoryReference { addr, size, kind, shard })
    }

    fn malformed(&self, reason: impl Into<String>) -> TraceParseError {
        TraceParseError::MalformedRecord {
            line: self.line_no,
            reason: reason.into(),
        }
    }
}

/// Parse a trace address, hex with `0x` prefix or decimal
fn parse_addr(field: &str) -> Result<u64, String> {
    if let Some(hex) = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        field.parse::<u64>().map_err(|e| e.to_string())
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<MemoryReference, TraceParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(TraceParseError::Io(e))),
            }
            self.line_no += 1;

            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }
            if let Some(rest) = text.strip_prefix('#') {
                // Detach from the line buffer before the &mut call below.
                let rest = rest.trim().to_string();
                if rest.contains('=') {
                    if let Err(e) = self.parse_directive(&rest) {
                        return Some(Err(e));
                    }
                }
                continue;
            }

            return Some(self.parse_record(text));
        }
    }
}
