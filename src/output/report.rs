//! Build the report structure and render the text report.
//!
//! The text layout follows the reference tool output: totals, distance
//! statistics, the instruction-distance table, the optional full histogram,
//! and the two top-address tables, repeated per shard after the aggregate.

use crate::aggregator::driver::RunOutcome;
use crate::aggregator::metrics::{
    distance_stats, histogram_rows, inst_distance_stats, top_by_distant_refs, top_by_total_refs,
};
use crate::engine::recency::TagCounts;
use crate::engine::shard::ShardSnapshot;
use crate::parser::schema::{
    ConfigSection, DistanceSection, FailedShard, HistogramRowSection, InstBucketSection,
    InstDistanceSection, Report, ShardSection, TopLineSection,
};
use crate::utils::config::{AnalyzerConfig, INST_DIST_BUCKETS, SCHEMA_VERSION};
use std::fmt::Write;

/// Assemble the JSON-serializable report from a finished run
///
/// **Public** - consumed by the JSON writer
pub fn build_report(outcome: &RunOutcome, cfg: &AnalyzerConfig) -> Report {
    Report {
        version: SCHEMA_VERSION.to_string(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        config: ConfigSection {
            line_size: cfg.line_size,
            distance_threshold: cfg.distance_threshold,
            skip_list_distance: cfg.skip_list_distance,
            report_top: cfg.report_top,
        },
        aggregate: build_section(&outcome.aggregate, cfg),
        shards: outcome
            .shards
            .iter()
            .map(|snap| build_section(snap, cfg))
            .collect(),
        failed_shards: outcome
            .failures
            .iter()
            .map(|(shard, error)| FailedShard {
                shard: *shard,
                error: error.clone(),
            })
            .collect(),
    }
}

fn build_section(snap: &ShardSnapshot, cfg: &AnalyzerConfig) -> ShardSection {
    let stats = distance_stats(&snap.dist_map);
    let inst_stats = inst_distance_stats(&snap.inst);

    let histogram = if cfg.report_histogram {
        Some(
            histogram_rows(&snap.dist_map)
                .into_iter()
                .map(|row| HistogramRowSection {
                    distance: row.distance,
                    count: row.count,
                    percent: row.percent,
                    cumulative_percent: row.cumulative_percent,
                })
                .collect(),
        )
    } else {
        None
    };

    let line_bits = cfg.line_size_bits();
    let to_line = |tc: &TagCounts| TopLineSection {
        line: format!("{:#x}", tc.tag << line_bits),
        total_refs: tc.total_refs,
        distant_refs: tc.distant_refs,
    };

    let buckets = snap
        .inst
        .buckets
        .iter()
        .take(INST_DIST_BUCKETS + 1)
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(i, &count)| InstBucketSection {
            lo: 1u64 << i,
            hi: if i < INST_DIST_BUCKETS {
                Some(1u64 << (i + 1))
            } else {
                None
            },
            count,
        })
        .collect();

    ShardSection {
        shard: snap.shard,
        total_refs: snap.total_refs,
        ignored_refs: snap.ignored_refs,
        unique_tags: snap.unique_tags,
        unique_lines: snap.unique_lines,
        distance: DistanceSection {
            count: stats.count,
            sum: stats.sum as f64,
            mean: stats.mean,
            median: stats.median,
            stddev: stats.stddev,
        },
        histogram,
        top_by_total_refs: top_by_total_refs(&snap.tags, cfg.report_top)
            .iter()
            .map(to_line)
            .collect(),
        top_by_distant_refs: top_by_distant_refs(&snap.tags, cfg.report_top)
            .iter()
            .map(to_line)
            .collect(),
        instruction_distance: InstDistanceSection {
            buckets,
            first_seen: snap.inst.first_seen(),
            reused_refs: snap.inst.reused_refs,
            total_instructions: snap.inst.total_instructions,
            mean: inst_stats.mean,
            stddev: inst_stats.stddev,
        },
    }
}

/// Render the full text report for a finished run
///
/// **Public** - printed to stdout by the analyze command
pub fn render_text(outcome: &RunOutcome, cfg: &AnalyzerConfig) -> String {
    let mut out = String::new();

    out.push_str("Reuse distance tool aggregated results:\n");
    render_section(&mut out, &outcome.aggregate, cfg);

    if outcome.shards.len() > 1 {
        for snap in &outcome.shards {
            let shard = snap.shard.unwrap_or_default();
            let _ = writeln!(
                out,
                "\n==================================================\n\
                 Reuse distance tool results for shard {}:",
                shard
            );
            render_section(&mut out, snap, cfg);
        }
    }

    if !outcome.failures.is_empty() {
        out.push_str("\n==================================================\n");
        for (shard, error) in &outcome.failures {
            let _ = writeln!(out, "Shard {} FAILED (excluded from aggregate): {}", shard, error);
        }
    }

    out
}

fn render_section(out: &mut String, snap: &ShardSnapshot, cfg: &AnalyzerConfig) {
    let stats = distance_stats(&snap.dist_map);

    let _ = writeln!(out, "Total accesses: {}", snap.total_refs);
    let _ = writeln!(out, "Ignored references: {}", snap.ignored_refs);
    let _ = writeln!(out, "Unique accesses: {}", snap.unique_tags);
    let _ = writeln!(out, "Unique cache lines accessed: {}", snap.unique_lines);
    out.push('\n');

    if stats.count > 0 {
        let _ = writeln!(out, "Reuse distance sum: {}", stats.sum);
        let _ = writeln!(out, "Reuse distance mean: {:.2}", stats.mean);
        let _ = writeln!(out, "Reuse distance median: {}", stats.median);
        let _ = writeln!(out, "Reuse distance standard deviation: {:.2}", stats.stddev);
        let _ = writeln!(out, "Reuse count: {}", stats.count);
    } else {
        let _ = writeln!(out, "No repeat accesses recorded.");
    }

    render_inst_table(out, snap);

    if cfg.report_histogram {
        out.push_str("\nReuse distance histogram:\n");
        let _ = writeln!(
            out,
            "{:>8}{:>12}  {:>8}  {:>10}",
            "Distance", "Count", "Percent", "Cumulative"
        );
        for row in histogram_rows(&snap.dist_map) {
            let _ = writeln!(
                out,
                "{:>8}{:>12}  {:>7.2}%  {:>9.2}%",
                row.distance, row.count, row.percent, row.cumulative_percent
            );
        }
    } else {
        out.push_str("(Pass --histogram to see all the data.)\n");
    }

    out.push('\n');
    let _ = writeln!(
        out,
        "Reuse distance threshold = {} cache lines",
        cfg.distance_threshold
    );

    let line_bits = cfg.line_size_bits();
    render_top_table(
        out,
        "frequently referenced cache lines",
        &top_by_total_refs(&snap.tags, cfg.report_top),
        line_bits,
    );
    render_top_table(
        out,
        "distant repeatedly referenced cache lines",
        &top_by_distant_refs(&snap.tags, cfg.report_top),
        line_bits,
    );
}

fn render_inst_table(out: &mut String, snap: &ShardSnapshot) {
    let inst_stats = inst_distance_stats(&snap.inst);

    out.push_str("\n====> Instruction Reuse Distance <====\n");
    for i in 0..INST_DIST_BUCKETS {
        let _ = writeln!(
            out,
            "[{:>14}, {:>14}): {}",
            1u64 << i,
            1u64 << (i + 1),
            snap.inst.buckets[i]
        );
    }
    let _ = writeln!(
        out,
        "[{:>14}, {:>14}): {}",
        1u64 << INST_DIST_BUCKETS,
        "inf",
        snap.inst.buckets[INST_DIST_BUCKETS]
    );
    let _ = writeln!(out, "First-seen instructions: {}", snap.inst.first_seen());
    let _ = writeln!(out, "Reused instruction count: {}", snap.inst.reused_refs);
    let _ = writeln!(
        out,
        "Total instruction count: {}",
        snap.inst.total_instructions
    );
    let _ = writeln!(out, "Instruction distance mean: {:.2}", inst_stats.mean);
    let _ = writeln!(
        out,
        "Instruction distance standard deviation: {:.2}",
        inst_stats.stddev
    );
}

fn render_top_table(out: &mut String, title: &str, top: &[TagCounts], line_bits: u32) {
    let _ = writeln!(out, "Top {} {}", top.len(), title);
    let _ = writeln!(
        out,
        "{:>18}: {:>14}  {:>14}",
        "cache line", "#references", "#distant refs"
    );
    for tc in top {
        let _ = writeln!(
            out,
            "{:>18}: {:>14}  {:>14}",
            format!("{:#x}", tc.tag << line_bits),
            tc.total_refs,
            tc.distant_refs
        );
    }
}
