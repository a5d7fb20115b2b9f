//! Per-stage job statistics

use std::fs;
use std::path::Path;

use chrono::Utc;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::commands::{print_error, print_json, EXIT_EXTERNAL_ERROR};
use crate::justin::JustinInterface;
use crate::report_models::{DistributionSummary, StageStatistics};
use crate::reports;

/// Format memory bytes into a human-readable string
fn format_memory_bytes(bytes: i64) -> String {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    if mb < 1024.0 {
        format!("{:.1} MB", mb)
    } else {
        format!("{:.2} GB", mb / 1024.0)
    }
}

/// Format a seconds distribution as "min/mean/max"
fn format_distribution(summary: &DistributionSummary) -> String {
    if summary.count == 0 {
        return "-".to_string();
    }
    format!(
        "{:.0}s/{:.0}s/{:.0}s",
        summary.min, summary.mean, summary.max
    )
}

/// Format a count map like "finished:18 failed:2"
fn format_counts<K: std::fmt::Display>(counts: &std::collections::BTreeMap<K, usize>) -> String {
    if counts.is_empty() {
        return "-".to_string();
    }
    counts
        .iter()
        .map(|(key, count)| format!("{}:{}", key, count))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Tabled)]
struct StageStatsRow {
    #[tabled(rename = "Stage")]
    stage_id: i64,
    #[tabled(rename = "Jobs")]
    job_count: usize,
    #[tabled(rename = "States")]
    states: String,
    #[tabled(rename = "Exit Codes")]
    exit_codes: String,
    #[tabled(rename = "Wall (min/mean/max)")]
    wall: String,
    #[tabled(rename = "CPU (min/mean/max)")]
    cpu: String,
    #[tabled(rename = "Peak RSS")]
    peak_rss: String,
}

impl From<&StageStatistics> for StageStatsRow {
    fn from(stage: &StageStatistics) -> Self {
        Self {
            stage_id: stage.stage_id,
            job_count: stage.job_count,
            states: format_counts(&stage.states),
            exit_codes: format_counts(&stage.exit_codes),
            wall: format_distribution(&stage.wall_seconds),
            cpu: format_distribution(&stage.cpu_seconds),
            peak_rss: stage
                .peak_rss_bytes
                .map(format_memory_bytes)
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Fetch the job listing, aggregate it per stage, and render the result.
pub fn handle_stats(
    justin: &dyn JustinInterface,
    workflow_id: &str,
    stage_id: Option<i64>,
    csv_path: Option<&Path>,
    format: &str,
) {
    let listing = match justin.show_jobs(workflow_id, stage_id) {
        Ok(listing) => listing,
        Err(e) => {
            print_error("listing jobs", &e);
            std::process::exit(EXIT_EXTERNAL_ERROR);
        }
    };

    let records = match reports::parse_show_jobs(&listing) {
        Ok(records) => records,
        Err(e) => {
            print_error("parsing the job listing", &e);
            std::process::exit(EXIT_EXTERNAL_ERROR);
        }
    };

    if let Some(path) = csv_path {
        let mut buffer = Vec::new();
        if let Err(e) = reports::write_csv(&records, &mut buffer) {
            print_error("formatting the CSV export", &e);
            std::process::exit(EXIT_EXTERNAL_ERROR);
        }
        if let Err(e) = fs::write(path, buffer) {
            print_error("writing the CSV export", &e);
            std::process::exit(EXIT_EXTERNAL_ERROR);
        }
        println!("Wrote {}", path.display());
    }

    let stats = reports::aggregate(workflow_id, &records, stage_id);

    if format == "json" {
        print_json(&stats);
        return;
    }

    if stats.total_jobs == 0 {
        println!("No jobs found for workflow {}", workflow_id);
        return;
    }

    let rows: Vec<StageStatsRow> = stats.stages.iter().map(StageStatsRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    println!(
        "Total jobs: {} (report generated {})",
        stats.total_jobs,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    if stats.unattributed_jobs > 0 {
        println!(
            "Note: {} job(s) had no stage id and were left out of the per-stage rows",
            stats.unattributed_jobs
        );
    }
}
