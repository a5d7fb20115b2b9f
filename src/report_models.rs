//! Shared data models for status and statistics reporting.
//!
//! These structs define the JSON output format of `mcflow stats` and are used
//! by both the parser/aggregator (in `reports.rs`) and the command handlers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One job row parsed from the external tool's show-jobs listing.
///
/// Every field except the job identifier is optional: columns the listing
/// does not carry, or that are empty for jobs still queued or running, come
/// back as `None` rather than failing the parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job identifier as printed by the service (e.g. "12345.0@pool.example")
    pub jobsub_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<i64>,
    /// Job state as reported by the service ("finished", "running", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_seconds: Option<i64>,
    /// CPU time over wall time, when the listing carries it (0.86 for "86%")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_fraction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rss_bytes: Option<i64>,
}

/// Min/mean/max over the jobs that reported a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionSummary {
    /// Jobs that contributed a value
    pub count: usize,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

impl DistributionSummary {
    /// Summarize the given samples; zero samples yield the default (all-zero)
    /// summary.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &sample in samples {
            min = min.min(sample);
            max = max.max(sample);
            sum += sample;
        }
        Self {
            count: samples.len(),
            min,
            mean: sum / samples.len() as f64,
            max,
        }
    }
}

/// Aggregated statistics for one stage of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatistics {
    pub stage_id: i64,
    pub job_count: usize,
    /// Job counts keyed by reported state
    pub states: BTreeMap<String, usize>,
    /// Job counts keyed by exit code, for jobs that reported one
    pub exit_codes: BTreeMap<i32, usize>,
    /// Wall-clock seconds distribution
    pub wall_seconds: DistributionSummary,
    /// CPU seconds distribution
    pub cpu_seconds: DistributionSummary,
    /// Largest resident set size reported by any job in the stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_rss_bytes: Option<i64>,
}

/// Output of `mcflow stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    pub workflow_id: String,
    pub total_jobs: usize,
    /// Jobs whose rows could not be attributed to a stage
    #[serde(default, skip_serializing_if = "is_zero")]
    pub unattributed_jobs: usize,
    pub stages: Vec<StageStatistics>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}
