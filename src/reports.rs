//! Parsing and aggregation of the external tool's job listings
//!
//! `justin show-jobs` prints a whitespace-aligned table. This module reshapes
//! that text into [`JobRecord`]s and aggregates them into per-stage
//! statistics (counts by state and exit code, wall/CPU time distributions,
//! peak RSS). Everything here is read-only over text the external tool
//! already produced.

use std::collections::BTreeMap;
use std::io::Write;

use regex::Regex;

use crate::errors::McflowError;
use crate::report_models::{
    DistributionSummary, JobRecord, StageStatistics, WorkflowStatistics,
};

/// Which of our record fields a listing column feeds.
#[derive(Clone, Copy, Debug, PartialEq)]
enum ColumnKind {
    JobsubId,
    Stage,
    State,
    ExitCode,
    WallTime,
    CpuTime,
    MaxRss,
    Other,
}

fn classify_header(header: &str) -> ColumnKind {
    let header = header.to_lowercase();
    if header.contains("jobsub") || header == "job" || header == "job id" {
        ColumnKind::JobsubId
    } else if header.contains("stage") {
        ColumnKind::Stage
    } else if header.contains("state") || header.contains("status") {
        ColumnKind::State
    } else if header.contains("exit") {
        ColumnKind::ExitCode
    } else if header.contains("real") || header.contains("wall") {
        ColumnKind::WallTime
    } else if header.contains("cpu") {
        ColumnKind::CpuTime
    } else if header.contains("rss") || header.contains("memory") {
        ColumnKind::MaxRss
    } else {
        ColumnKind::Other
    }
}

/// Compiled patterns for the field formats the service prints.
///
/// Times come in two shapes: plain "HH:MM:SS", or the dashboard style
/// "0m (22s)" with the seconds in parentheses; CPU times additionally carry
/// the utilization, "(19s = 86%)". RSS is "587616256 (560 MiB)" or a bare
/// byte count.
struct FieldParsers {
    seconds_in_parens: Regex,
    cpu_detail: Regex,
    hms: Regex,
    first_int: Regex,
}

impl FieldParsers {
    fn new() -> Result<Self, McflowError> {
        let build = |pattern: &str| {
            Regex::new(pattern).map_err(|e| McflowError::UnexpectedOutput {
                command: "show-jobs".to_string(),
                message: format!("internal pattern error: {}", e),
            })
        };
        Ok(Self {
            seconds_in_parens: build(r"\((\d+)s")?,
            cpu_detail: build(r"\(\s*(\d+)s\s*=\s*(\d+)%\s*\)")?,
            hms: build(r"^(\d+):(\d{2}):(\d{2})$")?,
            first_int: build(r"(-?\d+)")?,
        })
    }

    fn parse_seconds(&self, field: &str) -> Option<i64> {
        let field = field.trim();
        if field.is_empty() {
            return None;
        }
        if let Some(captures) = self.seconds_in_parens.captures(field) {
            return captures.get(1)?.as_str().parse().ok();
        }
        if let Some(captures) = self.hms.captures(field) {
            let hours: i64 = captures.get(1)?.as_str().parse().ok()?;
            let minutes: i64 = captures.get(2)?.as_str().parse().ok()?;
            let seconds: i64 = captures.get(3)?.as_str().parse().ok()?;
            return Some(hours * 3600 + minutes * 60 + seconds);
        }
        field.parse().ok()
    }

    fn parse_cpu(&self, field: &str) -> (Option<i64>, Option<f64>) {
        if let Some(captures) = self.cpu_detail.captures(field) {
            let seconds = captures.get(1).and_then(|m| m.as_str().parse().ok());
            let percent: Option<f64> = captures.get(2).and_then(|m| m.as_str().parse().ok());
            return (seconds, percent.map(|p| p / 100.0));
        }
        (self.parse_seconds(field), None)
    }

    fn parse_first_int(&self, field: &str) -> Option<i64> {
        self.first_int
            .captures(field)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// Parse a show-jobs table into job records.
///
/// The first non-empty line is taken as the header; columns are separated by
/// two or more spaces so that headers like "Exit code" stay together. Rows
/// with no recognizable job id are skipped, and unparseable optional fields
/// come back as `None` rather than failing the whole listing.
pub fn parse_show_jobs(text: &str) -> Result<Vec<JobRecord>, McflowError> {
    let parsers = FieldParsers::new()?;
    let column_split = Regex::new(r"\s{2,}").map_err(|e| McflowError::UnexpectedOutput {
        command: "show-jobs".to_string(),
        message: format!("internal pattern error: {}", e),
    })?;

    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header_line = match lines.next() {
        Some(line) => line,
        None => return Ok(Vec::new()),
    };

    let columns: Vec<ColumnKind> = column_split
        .split(header_line.trim())
        .map(classify_header)
        .collect();

    if !columns.contains(&ColumnKind::JobsubId) {
        return Err(McflowError::UnexpectedOutput {
            command: "show-jobs".to_string(),
            message: format!("listing header has no job id column: {:?}", header_line),
        });
    }

    let mut records = Vec::new();
    for line in lines {
        let fields: Vec<&str> = column_split.split(line.trim()).collect();

        let mut record = JobRecord {
            jobsub_id: String::new(),
            stage_id: None,
            state: None,
            exit_code: None,
            wall_seconds: None,
            cpu_seconds: None,
            cpu_fraction: None,
            max_rss_bytes: None,
        };

        for (kind, field) in columns.iter().zip(fields.iter()) {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            match kind {
                ColumnKind::JobsubId => record.jobsub_id = field.to_string(),
                ColumnKind::Stage => record.stage_id = parsers.parse_first_int(field),
                ColumnKind::State => record.state = Some(field.to_string()),
                ColumnKind::ExitCode => {
                    record.exit_code = parsers.parse_first_int(field).map(|v| v as i32)
                }
                ColumnKind::WallTime => record.wall_seconds = parsers.parse_seconds(field),
                ColumnKind::CpuTime => {
                    let (seconds, fraction) = parsers.parse_cpu(field);
                    record.cpu_seconds = seconds;
                    record.cpu_fraction = fraction;
                }
                ColumnKind::MaxRss => record.max_rss_bytes = parsers.parse_first_int(field),
                ColumnKind::Other => {}
            }
        }

        if record.jobsub_id.is_empty() {
            log::warn!("skipping malformed show-jobs line: {}", line);
            continue;
        }
        records.push(record);
    }

    Ok(records)
}

/// Aggregate job records into per-stage statistics.
///
/// Records without a stage id are counted in `unattributed_jobs` and excluded
/// from the per-stage tables. `stage_filter` restricts the output to one
/// stage when set.
pub fn aggregate(
    workflow_id: &str,
    records: &[JobRecord],
    stage_filter: Option<i64>,
) -> WorkflowStatistics {
    let mut by_stage: BTreeMap<i64, Vec<&JobRecord>> = BTreeMap::new();
    let mut unattributed = 0usize;
    let mut total = 0usize;

    for record in records {
        match record.stage_id {
            Some(stage_id) => {
                if stage_filter.is_some() && stage_filter != Some(stage_id) {
                    continue;
                }
                by_stage.entry(stage_id).or_default().push(record);
                total += 1;
            }
            None => {
                if stage_filter.is_none() {
                    unattributed += 1;
                    total += 1;
                }
            }
        }
    }

    let stages = by_stage
        .into_iter()
        .map(|(stage_id, jobs)| {
            let mut states: BTreeMap<String, usize> = BTreeMap::new();
            let mut exit_codes: BTreeMap<i32, usize> = BTreeMap::new();
            let mut wall = Vec::new();
            let mut cpu = Vec::new();
            let mut peak_rss: Option<i64> = None;

            for job in &jobs {
                if let Some(state) = &job.state {
                    *states.entry(state.clone()).or_default() += 1;
                }
                if let Some(code) = job.exit_code {
                    *exit_codes.entry(code).or_default() += 1;
                }
                if let Some(seconds) = job.wall_seconds {
                    wall.push(seconds as f64);
                }
                if let Some(seconds) = job.cpu_seconds {
                    cpu.push(seconds as f64);
                }
                if let Some(rss) = job.max_rss_bytes {
                    peak_rss = Some(peak_rss.map_or(rss, |current| current.max(rss)));
                }
            }

            StageStatistics {
                stage_id,
                job_count: jobs.len(),
                states,
                exit_codes,
                wall_seconds: DistributionSummary::from_samples(&wall),
                cpu_seconds: DistributionSummary::from_samples(&cpu),
                peak_rss_bytes: peak_rss,
            }
        })
        .collect();

    WorkflowStatistics {
        workflow_id: workflow_id.to_string(),
        total_jobs: total,
        unattributed_jobs: unattributed,
        stages,
    }
}

/// Write job records as CSV, one row per job, empty cells for missing fields.
pub fn write_csv<W: Write>(records: &[JobRecord], mut writer: W) -> std::io::Result<()> {
    writeln!(
        writer,
        "job,stage_id,state,exit,wall_s,cpu_s,maxrss_bytes"
    )?;
    for record in records {
        let optional = |value: Option<String>| value.unwrap_or_default();
        writeln!(
            writer,
            "{},{},{},{},{},{},{}",
            record.jobsub_id,
            optional(record.stage_id.map(|v| v.to_string())),
            optional(record.state.clone()),
            optional(record.exit_code.map(|v| v.to_string())),
            optional(record.wall_seconds.map(|v| v.to_string())),
            optional(record.cpu_seconds.map(|v| v.to_string())),
            optional(record.max_rss_bytes.map(|v| v.to_string())),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LISTING: &str = "\
Jobsub ID                    Stage  State     Exit code  Real time    CPU time        Max RSS bytes
12345.0@pool.example.org     1      finished  0          0m (22s)     (19s = 86%)     587616256 (560 MiB)
12345.1@pool.example.org     1      finished  0          00:21:34     00:20:58        2147483648
12345.2@pool.example.org     2      running
12345.3@pool.example.org     1      finished  134        0m (30s)     (12s = 40%)     587616256
";

    #[test]
    fn parses_listing_with_mixed_time_formats() {
        let records = parse_show_jobs(SAMPLE_LISTING).unwrap();
        assert_eq!(records.len(), 4);

        assert_eq!(records[0].jobsub_id, "12345.0@pool.example.org");
        assert_eq!(records[0].stage_id, Some(1));
        assert_eq!(records[0].state.as_deref(), Some("finished"));
        assert_eq!(records[0].exit_code, Some(0));
        assert_eq!(records[0].wall_seconds, Some(22));
        assert_eq!(records[0].cpu_seconds, Some(19));
        assert_eq!(records[0].cpu_fraction, Some(0.86));
        assert_eq!(records[0].max_rss_bytes, Some(587_616_256));

        // HH:MM:SS form
        assert_eq!(records[1].wall_seconds, Some(21 * 60 + 34));
        assert_eq!(records[1].cpu_seconds, Some(20 * 60 + 58));

        // Still-running job has no result columns
        assert_eq!(records[2].state.as_deref(), Some("running"));
        assert_eq!(records[2].exit_code, None);
        assert_eq!(records[2].wall_seconds, None);
    }

    #[test]
    fn empty_listing_yields_no_records() {
        assert!(parse_show_jobs("").unwrap().is_empty());
        assert!(parse_show_jobs("Jobsub ID  Stage  State\n").unwrap().is_empty());
    }

    #[test]
    fn rejects_listing_without_job_id_column() {
        let err = parse_show_jobs("Foo  Bar\n1  2\n").unwrap_err();
        assert!(err.to_string().contains("no job id column"));
    }

    #[test]
    fn aggregates_per_stage() {
        let records = parse_show_jobs(SAMPLE_LISTING).unwrap();
        let stats = aggregate("12080", &records, None);

        assert_eq!(stats.workflow_id, "12080");
        assert_eq!(stats.total_jobs, 4);
        assert_eq!(stats.stages.len(), 2);

        let stage1 = &stats.stages[0];
        assert_eq!(stage1.stage_id, 1);
        assert_eq!(stage1.job_count, 3);
        assert_eq!(stage1.states.get("finished"), Some(&3));
        assert_eq!(stage1.exit_codes.get(&0), Some(&2));
        assert_eq!(stage1.exit_codes.get(&134), Some(&1));
        assert_eq!(stage1.wall_seconds.count, 3);
        assert_eq!(stage1.peak_rss_bytes, Some(2_147_483_648));

        let stage2 = &stats.stages[1];
        assert_eq!(stage2.stage_id, 2);
        assert_eq!(stage2.states.get("running"), Some(&1));
        assert_eq!(stage2.wall_seconds.count, 0);
    }

    #[test]
    fn stage_filter_restricts_output() {
        let records = parse_show_jobs(SAMPLE_LISTING).unwrap();
        let stats = aggregate("12080", &records, Some(2));
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.stages.len(), 1);
        assert_eq!(stats.stages[0].stage_id, 2);
    }

    #[test]
    fn csv_export_keeps_one_row_per_job() {
        let records = parse_show_jobs(SAMPLE_LISTING).unwrap();
        let mut buffer = Vec::new();
        write_csv(&records, &mut buffer).unwrap();
        let csv = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "job,stage_id,state,exit,wall_s,cpu_s,maxrss_bytes");
        assert_eq!(lines[1], "12345.0@pool.example.org,1,finished,0,22,19,587616256");
        assert_eq!(lines[3], "12345.2@pool.example.org,2,running,,,,");
    }
}
