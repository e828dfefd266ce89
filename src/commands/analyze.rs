//! Analyze command implementation.
//!
//! The analyze command:
//! 1. Reads the trace file(s), checking header consistency
//! 2. Runs the reuse-distance engine (parallel per shard, or serial)
//! 3. Prints the text report
//! 4. Writes the JSON report (if requested)
//!
//! The whole run fails (non-zero exit) if any shard records an error.

use crate::aggregator::driver::{Driver, RunOutcome};
use crate::output::{build_report, render_text, write_report};
use crate::parser::record::{MemoryReference, ShardKey};
use crate::parser::trace::TraceReader;
use crate::utils::config::{AnalyzerConfig, DEFAULT_LINE_SIZE};
use crate::utils::error::ConfigError;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

/// Arguments for the analyze command
///
/// **Public** - constructed from CLI args in main.rs
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    /// Trace files to analyze together
    pub traces: Vec<PathBuf>,

    /// Cache line size override; None defers to the trace header or default
    pub line_size: Option<u64>,

    /// Stack-distance cutoff for "distant" re-references
    pub distance_threshold: u64,

    /// Approximate-mode horizon; 0 = exact
    pub skip_list_distance: u64,

    /// Run exact and approximate distance side by side
    pub verify_skip: bool,

    /// Emit the full per-distance histogram table
    pub report_histogram: bool,

    /// Rows in the top-address tables
    pub report_top: usize,

    /// Stop after this many references
    pub limit: Option<u64>,

    /// Force single-threaded dispatch
    pub serial: bool,

    /// Output path for the JSON report (optional)
    pub output_json: Option<PathBuf>,
}

impl Default for AnalyzeArgs {
    fn default() -> Self {
        Self {
            traces: Vec::new(),
            line_size: None,
            distance_threshold: crate::utils::config::DEFAULT_DISTANCE_THRESHOLD,
            skip_list_distance: 0,
            verify_skip: false,
            report_histogram: false,
            report_top: crate::utils::config::DEFAULT_REPORT_TOP,
            limit: None,
            serial: false,
            output_json: None,
        }
    }
}

/// Validate analyze arguments before doing any work
///
/// **Public** - called from main.rs for early validation
pub fn validate_args(args: &AnalyzeArgs) -> Result<()> {
    if args.traces.is_empty() {
        anyhow::bail!("at least one trace file is required");
    }
    for path in &args.traces {
        if !path.exists() {
            anyhow::bail!("trace file not found: {}", path.display());
        }
    }
    if args.report_top == 0 {
        anyhow::bail!("--top must be greater than 0");
    }
    if let Some(size) = args.line_size {
        if size == 0 || !size.is_power_of_two() {
            anyhow::bail!("--line-size must be a non-zero power of two, got {}", size);
        }
    }
    Ok(())
}

/// Execute the analyze command
///
/// **Public** - main entry point called from main.rs
pub fn execute_analyze(args: AnalyzeArgs) -> Result<()> {
    let start_time = Instant::now();

    validate_args(&args)?;

    info!("Step 1/4: Reading {} trace file(s)...", args.traces.len());
    let loaded = read_traces(&args.traces, args.limit).context("Failed to read trace input")?;
    info!(
        "Read {} references ({} lines skipped)",
        loaded.references.len(),
        loaded.skipped_lines
    );

    let cfg = resolve_config(&args, loaded.header_line_size)?;
    debug!("resolved config: {:?}", cfg);

    info!("Step 2/4: Running reuse-distance engine...");
    let outcome = run_engine(&args, cfg.clone(), loaded.references)?;

    info!("Step 3/4: Rendering report...");
    println!("{}", render_text(&outcome, &cfg));

    if let Some(path) = &args.output_json {
        info!("Step 4/4: Writing JSON report...");
        let report = build_report(&outcome, &cfg);
        write_report(&report, path).context("Failed to write JSON report")?;
        info!("Report written to: {}", path.display());
    } else {
        info!("Step 4/4: Skipping JSON report (not requested)");
    }

    let elapsed = start_time.elapsed();
    info!("Analysis completed in {:.2}s", elapsed.as_secs_f64());

    if !outcome.is_clean() {
        let summary: Vec<String> = outcome
            .failures
            .iter()
            .map(|(shard, error)| format!("shard {}: {}", shard, error))
            .collect();
        anyhow::bail!("analysis failed for {}", summary.join("; "));
    }

    Ok(())
}

/// Everything collected while reading the trace files
struct LoadedTraces {
    references: Vec<MemoryReference>,
    header_line_size: Option<u64>,
    skipped_lines: u64,
}

/// Read all trace files, enforcing header consistency across them.
///
/// Malformed lines are logged and skipped (never fatal); conflicting header
/// directives across files are a configuration error.
fn read_traces(paths: &[PathBuf], limit: Option<u64>) -> Result<LoadedTraces> {
    let mut references = Vec::new();
    let mut skipped_lines = 0u64;
    let mut header_line_size: Option<u64> = None;

    'files: for path in paths {
        debug!("reading trace: {}", path.display());
        let mut reader = TraceReader::from_path(path)
            .with_context(|| format!("cannot open {}", path.display()))?;

        for item in &mut reader {
            match item {
                Ok(r) => {
                    references.push(r);
                    if let Some(limit) = limit {
                        if references.len() as u64 >= limit {
                            info!("reference limit {} reached, stopping input", limit);
                            break 'files;
                        }
                    }
                }
                Err(e) => {
                    warn!("{}: {}", path.display(), e);
                    skipped_lines += 1;
                }
            }
        }

        if let Some(declared) = reader.header().line_size {
            match header_line_size {
                None => header_line_size = Some(declared),
                Some(first) if first != declared => {
                    return Err(ConfigError::InconsistentInputs {
                        knob: "line_size",
                        first,
                        second: declared,
                    }
                    .into());
                }
                Some(_) => {}
            }
        }
    }

    Ok(LoadedTraces {
        references,
        header_line_size,
        skipped_lines,
    })
}

/// Build the final config: CLI override, then trace header, then default
fn resolve_config(args: &AnalyzeArgs, header_line_size: Option<u64>) -> Result<AnalyzerConfig> {
    let line_size = match (args.line_size, header_line_size) {
        (Some(cli), _) => cli,
        (None, Some(declared)) => {
            info!("using line_size={} declared by the trace header", declared);
            declared
        }
        (None, None) => DEFAULT_LINE_SIZE,
    };

    let cfg = AnalyzerConfig {
        line_size,
        distance_threshold: args.distance_threshold,
        skip_list_distance: args.skip_list_distance,
        verify_skip: args.verify_skip,
        report_histogram: args.report_histogram,
        report_top: args.report_top,
        max_refs: args.limit,
        ..Default::default()
    };
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

/// Run the engine over the collected references
fn run_engine(
    args: &AnalyzeArgs,
    cfg: AnalyzerConfig,
    references: Vec<MemoryReference>,
) -> Result<RunOutcome> {
    if args.serial {
        let mut driver = Driver::new(cfg)?;
        for r in &references {
            driver.dispatch(r);
        }
        return Ok(driver.finalize());
    }

    // Partition by shard, preserving each shard's original order, and let
    // one worker thread own each shard.
    let mut streams: BTreeMap<ShardKey, Vec<MemoryReference>> = BTreeMap::new();
    for r in references {
        streams.entry(r.shard).or_default().push(r);
    }
    let streams: Vec<(ShardKey, Vec<MemoryReference>)> = streams.into_iter().collect();
    info!("dispatching {} shard(s) to worker threads", streams.len());

    let driver = Driver::run_parallel(cfg, &streams)?;
    Ok(driver.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as IoWrite;
    use tempfile::NamedTempFile;

    fn trace_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_validate_args_requires_traces() {
        let args = AnalyzeArgs::default();
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_missing_file() {
        let args = AnalyzeArgs {
            traces: vec![PathBuf::from("/no/such/trace.txt")],
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_bad_line_size() {
        let file = trace_file("1 I 0x10\n");
        let args = AnalyzeArgs {
            traces: vec![file.path().to_path_buf()],
            line_size: Some(48),
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_read_traces_counts_skipped() {
        let file = trace_file("1 I 0x10\nbogus line\n1 I 0x20\n");
        let loaded = read_traces(&[file.path().to_path_buf()], None).unwrap();
        assert_eq!(loaded.references.len(), 2);
        assert_eq!(loaded.skipped_lines, 1);
    }

    #[test]
    fn test_read_traces_limit() {
        let file = trace_file("1 I 0x10\n1 I 0x20\n1 I 0x30\n");
        let loaded = read_traces(&[file.path().to_path_buf()], Some(2)).unwrap();
        assert_eq!(loaded.references.len(), 2);
    }

    #[test]
    fn test_conflicting_headers_fatal() {
        let a = trace_file("# line_size=64\n1 I 0x10\n");
        let b = trace_file("# line_size=32\n1 I 0x20\n");
        let result = read_traces(&[a.path().to_path_buf(), b.path().to_path_buf()], None);
        assert!(result.is_err());
    }

    #[test]
    fn test_matching_headers_accepted() {
        let a = trace_file("# line_size=64\n1 I 0x10\n");
        let b = trace_file("# line_size=64\n1 I 0x20\n");
        let loaded = read_traces(&[a.path().to_path_buf(), b.path().to_path_buf()], None).unwrap();
        assert_eq!(loaded.header_line_size, Some(64));
        assert_eq!(loaded.references.len(), 2);
    }

    #[test]
    fn test_resolve_config_precedence() {
        let args = AnalyzeArgs {
            line_size: Some(128),
            ..Default::default()
        };
        // CLI wins over the header.
        assert_eq!(resolve_config(&args, Some(64)).unwrap().line_size, 128);
        // Header wins over the default.
        let args = AnalyzeArgs::default();
        assert_eq!(resolve_config(&args, Some(64)).unwrap().line_size, 64);
        // Default otherwise.
        assert_eq!(
            resolve_config(&args, None).unwrap().line_size,
            DEFAULT_LINE_SIZE
        );
    }

    #[test]
    fn test_execute_analyze_end_to_end() {
        let file = trace_file("# line_size=1\n1 I 0xa\n1 I 0xb\n1 I 0xc\n1 I 0xa\n1 I 0xb\n1 I 0xa\n");
        let out_dir = tempfile::tempdir().unwrap();
        let json_path = out_dir.path().join("report.json");
        let args = AnalyzeArgs {
            traces: vec![file.path().to_path_buf()],
            distance_threshold: 1,
            output_json: Some(json_path.clone()),
            ..Default::default()
        };
        execute_analyze(args).unwrap();

        let report = crate::output::read_report(&json_path).unwrap();
        assert_eq!(report.aggregate.total_refs, 6);
        assert_eq!(report.aggregate.unique_tags, 3);
        assert_eq!(report.aggregate.distance.median, 2);
    }

    #[test]
    fn test_execute_analyze_fails_on_bad_shard() {
        let file = trace_file("1 I 0xa\n1 X\n1 I 0xb\n");
        let args = AnalyzeArgs {
            traces: vec![file.path().to_path_buf()],
            ..Default::default()
        };
        assert!(execute_analyze(args).is_err());
    }
}
