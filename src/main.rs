//! Reuse Trace CLI
//!
//! Offline reuse-distance analysis for recorded memory reference traces.
//! Computes per-shard and aggregate stack-distance statistics and reports.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use reuse_trace::commands::{execute_analyze, AnalyzeArgs};
use reuse_trace::utils::config::SCHEMA_VERSION;

/// Reuse Trace - reuse-distance analysis for memory reference traces
#[derive(Parser, Debug)]
#[command(name = "reuse-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze one or more trace files
    Analyze {
        /// Trace files, analyzed together as one run
        #[arg(required = true)]
        traces: Vec<PathBuf>,

        /// Cache line size in bytes (power of two); defaults to the trace
        /// header declaration, then 64
        #[arg(long, env = "REUSE_TRACE_LINE_SIZE")]
        line_size: Option<u64>,

        /// Stack distances above this count as "distant" re-references
        #[arg(long, default_value = "100")]
        distance_threshold: u64,

        /// Approximate-distance horizon; 0 computes exact distances
        #[arg(long, default_value = "0")]
        skip_distance: u64,

        /// Run exact and approximate distances side by side and report drift
        #[arg(long)]
        verify_skip: bool,

        /// Print the full per-distance histogram table
        #[arg(long)]
        histogram: bool,

        /// Number of rows in the top-address tables
        #[arg(long, default_value = "10")]
        top: usize,

        /// Stop after this many references
        #[arg(long)]
        limit: Option<u64>,

        /// Process all shards on one thread instead of one thread per shard
        #[arg(long)]
        serial: bool,

        /// Output path for the JSON report (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a report JSON file
    Validate {
        /// Path to report JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display report schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Analyze {
            traces,
            line_size,
            distance_threshold,
            skip_distance,
            verify_skip,
            histogram,
            top,
            limit,
            serial,
            output,
        } => {
            let args = AnalyzeArgs {
                traces,
                line_size,
                distance_threshold,
                skip_list_distance: skip_distance,
                verify_skip,
                report_histogram: histogram,
                report_top: top,
                limit,
                serial,
                output_json: output,
            };
            execute_analyze(args)?;
        }

        Commands::Validate { file } => {
            validate_report_file(file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}

/// Validate a report JSON file
///
/// **Private** - internal command implementation
fn validate_report_file(file_path: PathBuf) -> Result<()> {
    use reuse_trace::output::read_report;

    println!("Validating report: {}", file_path.display());

    let report = read_report(&file_path)?;

    println!("✓ Valid report JSON");
    println!("  Version: {}", report.version);
    println!("  Total accesses: {}", report.aggregate.total_refs);
    println!("  Unique cache lines: {}", report.aggregate.unique_lines);
    println!("  Shards: {}", report.shards.len());
    if !report.failed_shards.is_empty() {
        println!("  Failed shards: {}", report.failed_shards.len());
    }

    Ok(())
}

/// Display schema information
///
/// **Private** - internal command implementation
fn display_schema(show_details: bool) {
    println!("Reuse Trace Report Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Schema Structure:");
        println!("  version: string            - Schema version (e.g., '1.0.0')");
        println!("  generated_at: string       - ISO 8601 timestamp");
        println!("  config: object             - Knobs the analysis ran with");
        println!("  aggregate: object          - Merged view over all shards");
        println!("    total_refs: number       - Qualifying instruction references");
        println!("    unique_tags: number      - Distinct tags (summed per shard)");
        println!("    unique_lines: number     - Distinct cache lines (deduplicated)");
        println!("    distance: object         - count/sum/mean/median/stddev");
        println!("    histogram: array?        - Per-distance rows (if requested)");
        println!("    top_by_total_refs: array - Top cache lines by references");
        println!("    top_by_distant_refs: array - Top cache lines by distant refs");
        println!("    instruction_distance: object - Coarser time-distance table");
        println!("  shards: array              - Same shape, one per shard");
        println!("  failed_shards: array       - Shards excluded from the merge");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
///
/// **Private** - internal command implementation
fn display_version() {
    println!("Reuse Trace v{}", env!("CARGO_PKG_VERSION"));
    println!("Report Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Offline reuse-distance analysis for memory reference traces.");
}
