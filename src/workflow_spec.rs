use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::McflowError;

/// Software release installed on the worker nodes when a stage does not pin one.
pub const DEFAULT_SOFTWARE_VERSION: &str = "v10_17_01d00";

/// Environment variables that mcflow derives from typed stage fields.
///
/// Setting these directly in a stage's `env` list works but bypasses the typed
/// fields (`events_per_job`, `fhicl_file`, ...), so validation flags them with
/// a warning.
pub const RESERVED_ENV_KEYS: &[&str] = &[
    "NEVENTS",
    "JOB_FHICL_FILE",
    "FCL_TGZ_URL",
    "DUNESW_VERSION",
    "INPUT_TAR_DIR_LOCAL",
];

/// Result of validating a workflow specification (dry-run)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the validation passed with no errors
    pub valid: bool,
    /// Validation errors that would prevent workflow submission
    pub errors: Vec<String>,
    /// Warnings that don't prevent submission but may indicate issues
    pub warnings: Vec<String>,
    /// Summary of what would be submitted
    pub summary: ValidationSummary,
}

/// Summary of the workflow that would be submitted
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Description passed to create-workflow
    pub description: String,
    /// Number of Monte Carlo jobs requested
    pub monte_carlo_jobs: i64,
    /// Number of stages
    pub stage_count: usize,
    /// Stage ids in declaration order
    pub stage_ids: Vec<i64>,
    /// Job script references (repo/path:ref) per stage
    pub jobscripts: Vec<String>,
}

/// Defaults applied to every stage that does not set the field itself.
///
/// Mirrors the per-stage fields; a stage value always wins. The `env` list is
/// the one exception: default entries and stage entries are merged, with the
/// stage entry winning for a key present in both.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDefaults {
    /// Repository holding the job scripts (e.g. "SFBayLaser/dune-justin")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Branch or tag to pull job scripts from
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Wall-clock limit in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_seconds: Option<i64>,
    /// Resident memory limit in MiB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss_mib: Option<i64>,
    /// Number of processors to request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processors: Option<i64>,
    /// Whether jobs need a GPU
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<bool>,
    /// Environment assignments ("KEY=VALUE") merged into every stage
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Software release to run (DUNESW_VERSION)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
    /// URL of the FHiCL bundle workers download (FCL_TGZ_URL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fhicl_bundle_url: Option<String>,
    /// Directory with a locally-built code tarball (INPUT_TAR_DIR_LOCAL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tarball_dir: Option<String>,
    /// Days the outputs are retained in the catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime_days: Option<i64>,
    /// Maximum site-to-storage distance for job placement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f64>,
    /// Restrict execution to these sites
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sites: Option<Vec<String>>,
    /// Extra HTCondor classad expressions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classads: Option<Vec<String>>,
    /// Storage element outputs are written to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_rse: Option<String>,
    /// Storage-location expression for output placement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_rse_expression: Option<String>,
}

/// Specification for one stage of a workflow
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    /// Stage index. Must run 1..N with no gaps, in declaration order.
    pub stage_id: i64,
    /// Repository holding the job script
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Path of the job script inside the repository
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobscript: Option<String>,
    /// Branch or tag the job script is pulled from
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Wall-clock limit in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_seconds: Option<i64>,
    /// Resident memory limit in MiB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss_mib: Option<i64>,
    /// Number of processors to request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processors: Option<i64>,
    /// Whether jobs need a GPU
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<bool>,
    /// Environment assignments, one "KEY=VALUE" per entry. Keys must be
    /// unique within a stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// FHiCL configuration the job script runs (JOB_FHICL_FILE)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fhicl_file: Option<String>,
    /// Events generated or processed per job (NEVENTS)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_per_job: Option<i64>,
    /// URL of the FHiCL bundle workers download (FCL_TGZ_URL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fhicl_bundle_url: Option<String>,
    /// Software release to run (DUNESW_VERSION). Defaults to
    /// [`DEFAULT_SOFTWARE_VERSION`] at submission time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
    /// Directory with a locally-built code tarball (INPUT_TAR_DIR_LOCAL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tarball_dir: Option<String>,
    /// Glob matched against output files handed to the next stage. Required
    /// on every stage except the last; this is what links the chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_pattern_next_stage: Option<String>,
    /// Globs matched against final output files registered in the catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_patterns: Vec<String>,
    /// Storage element final outputs are written to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_rse: Option<String>,
    /// Storage-location expression for output placement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_rse_expression: Option<String>,
    /// Days the outputs are retained
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime_days: Option<i64>,
    /// Maximum site-to-storage distance for job placement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f64>,
    /// Restrict execution to these sites
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sites: Option<Vec<String>>,
    /// Extra HTCondor classad expressions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classads: Option<Vec<String>>,
}

impl StageSpec {
    /// The --jobscript-git argument, "repo/path:ref", once repo, jobscript,
    /// and ref are all resolved.
    pub fn jobscript_git(&self) -> Option<String> {
        match (&self.repo, &self.jobscript, &self.git_ref) {
            (Some(repo), Some(script), Some(git_ref)) => {
                Some(format!("{}/{}:{}", repo, script, git_ref))
            }
            _ => None,
        }
    }

    /// Fill unset fields from the workflow defaults. Env lists merge, with
    /// the stage entry winning for a key present in both.
    fn apply_defaults(&mut self, defaults: &StageDefaults) {
        if self.repo.is_none() {
            self.repo = defaults.repo.clone();
        }
        if self.git_ref.is_none() {
            self.git_ref = defaults.git_ref.clone();
        }
        if self.wall_seconds.is_none() {
            self.wall_seconds = defaults.wall_seconds;
        }
        if self.rss_mib.is_none() {
            self.rss_mib = defaults.rss_mib;
        }
        if self.processors.is_none() {
            self.processors = defaults.processors;
        }
        if self.gpu.is_none() {
            self.gpu = defaults.gpu;
        }
        if self.software_version.is_none() {
            self.software_version = defaults.software_version.clone();
        }
        if self.fhicl_bundle_url.is_none() {
            self.fhicl_bundle_url = defaults.fhicl_bundle_url.clone();
        }
        if self.tarball_dir.is_none() {
            self.tarball_dir = defaults.tarball_dir.clone();
        }
        if self.lifetime_days.is_none() {
            self.lifetime_days = defaults.lifetime_days;
        }
        if self.max_distance.is_none() {
            self.max_distance = defaults.max_distance;
        }
        if self.sites.is_none() {
            self.sites = defaults.sites.clone();
        }
        if self.classads.is_none() {
            self.classads = defaults.classads.clone();
        }
        if self.output_rse.is_none() {
            self.output_rse = defaults.output_rse.clone();
        }
        if self.output_rse_expression.is_none() {
            self.output_rse_expression = defaults.output_rse_expression.clone();
        }

        if !defaults.env.is_empty() {
            let stage_keys: HashSet<&str> = self
                .env
                .iter()
                .filter_map(|e| split_env_entry(e).map(|(k, _)| k))
                .collect();
            let mut merged: Vec<String> = defaults
                .env
                .iter()
                .filter(|e| match split_env_entry(e) {
                    Some((key, _)) => !stage_keys.contains(key),
                    None => true,
                })
                .cloned()
                .collect();
            merged.append(&mut self.env);
            self.env = merged;
        }
    }
}

/// Split a "KEY=VALUE" environment entry. Returns None if there is no '='
/// or the key is empty; the value may be empty.
pub fn split_env_entry(entry: &str) -> Option<(&str, &str)> {
    let (key, value) = entry.split_once('=')?;
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Declarative description of a multi-stage Monte Carlo workflow.
///
/// Constructed once from a JSON or YAML file, validated, and then handed to
/// the submitter. The external service assigns the workflow its identifier at
/// creation time; the spec itself has no persistent identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSpec {
    /// Human-readable description passed to create-workflow
    pub description: String,
    /// Total number of Monte Carlo jobs to run through the first stage
    pub monte_carlo: i64,
    /// Optional campaign the outputs are registered under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    /// Defaults applied to every stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<StageDefaults>,
    /// Stages in execution order
    pub stages: Vec<StageSpec>,
}

impl WorkflowSpec {
    /// Deserialize a WorkflowSpec from a specification file (JSON, JSON5, or
    /// YAML). All formats are first converted to serde_json::Value, then to
    /// WorkflowSpec, ensuring consistent behavior across formats.
    pub fn from_spec_file<P: AsRef<Path>>(path: P) -> Result<WorkflowSpec, McflowError> {
        let path_ref = path.as_ref();
        let file_content = fs::read_to_string(path_ref).map_err(|e| McflowError::SpecIo {
            path: path_ref.display().to_string(),
            source: e,
        })?;

        let extension = path_ref
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let parse_error = |message: String| McflowError::SpecParse {
            path: path_ref.display().to_string(),
            message,
        };

        let json_value: serde_json::Value = match extension.to_lowercase().as_str() {
            "json" => serde_json::from_str(&file_content).map_err(|e| parse_error(e.to_string()))?,
            "json5" => json5::from_str(&file_content).map_err(|e| parse_error(e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&file_content).map_err(|e| parse_error(e.to_string()))?
            }
            _ => {
                // Unknown extension: try JSON first, then JSON5, then YAML
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&file_content) {
                    value
                } else if let Ok(value) = json5::from_str::<serde_json::Value>(&file_content) {
                    value
                } else {
                    serde_yaml::from_str(&file_content).map_err(|e| {
                        parse_error(format!("not valid JSON, JSON5, or YAML: {}", e))
                    })?
                }
            }
        };

        serde_json::from_value(json_value).map_err(|e| parse_error(e.to_string()))
    }

    /// Serialize back to the declarative file format ("json" or "yaml").
    /// Re-loading the result yields an identical structure.
    pub fn to_spec_string(&self, format: &str) -> Result<String, McflowError> {
        match format.to_lowercase().as_str() {
            "json" => serde_json::to_string_pretty(self).map_err(|e| McflowError::SpecParse {
                path: String::new(),
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::to_string(self).map_err(|e| McflowError::SpecParse {
                path: String::new(),
                message: e.to_string(),
            }),
            other => Err(McflowError::SpecParse {
                path: String::new(),
                message: format!("unknown output format: {}", other),
            }),
        }
    }

    /// Merge workflow-level defaults into every stage.
    pub fn apply_defaults(&mut self) {
        if let Some(defaults) = self.defaults.take() {
            for stage in &mut self.stages {
                stage.apply_defaults(&defaults);
            }
        }
    }

    /// Whether the stage at `index` is the last one in the chain.
    fn is_final_stage(&self, index: usize) -> bool {
        index + 1 == self.stages.len()
    }

    /// Run all checks in one pass, collecting every problem found.
    ///
    /// Call after [`apply_defaults`](Self::apply_defaults); otherwise stages
    /// relying on workflow-level defaults report spurious missing fields.
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.description.trim().is_empty() {
            errors.push("workflow description must not be empty".to_string());
        }
        if self.monte_carlo < 1 {
            errors.push(format!(
                "monte_carlo job count must be at least 1, got {}",
                self.monte_carlo
            ));
        }
        if self.stages.is_empty() {
            errors.push("workflow must contain at least one stage".to_string());
        }

        for (index, stage) in self.stages.iter().enumerate() {
            let expected_id = (index + 1) as i64;
            if stage.stage_id != expected_id {
                errors.push(format!(
                    "stage ids must be contiguous starting at 1: position {} has stage_id {}",
                    expected_id, stage.stage_id
                ));
            }

            let label = format!("stage {}", stage.stage_id);

            if stage.repo.as_deref().map_or(true, |s| s.is_empty()) {
                errors.push(format!(
                    "{}: repo is missing (set it on the stage or in defaults)",
                    label
                ));
            }
            if stage.jobscript.as_deref().map_or(true, |s| s.is_empty()) {
                errors.push(format!("{}: jobscript is missing", label));
            }
            if stage.git_ref.as_deref().map_or(true, |s| s.is_empty()) {
                errors.push(format!(
                    "{}: ref is missing (set it on the stage or in defaults)",
                    label
                ));
            }

            match stage.wall_seconds {
                None => errors.push(format!("{}: wall_seconds is missing", label)),
                Some(v) if v <= 0 => {
                    errors.push(format!("{}: wall_seconds must be positive, got {}", label, v))
                }
                Some(_) => {}
            }
            match stage.rss_mib {
                None => errors.push(format!("{}: rss_mib is missing", label)),
                Some(v) if v <= 0 => {
                    errors.push(format!("{}: rss_mib must be positive, got {}", label, v))
                }
                Some(_) => {}
            }
            if let Some(v) = stage.processors {
                if v <= 0 {
                    errors.push(format!("{}: processors must be positive, got {}", label, v));
                }
            }
            if let Some(v) = stage.events_per_job {
                if v <= 0 {
                    errors.push(format!(
                        "{}: events_per_job must be positive, got {}",
                        label, v
                    ));
                }
            }
            if let Some(v) = stage.lifetime_days {
                if v <= 0 {
                    errors.push(format!(
                        "{}: lifetime_days must be positive, got {}",
                        label, v
                    ));
                }
            }
            if let Some(v) = stage.max_distance {
                if v < 0.0 {
                    errors.push(format!(
                        "{}: max_distance must not be negative, got {}",
                        label, v
                    ));
                }
            }

            let mut seen_keys = HashSet::new();
            for entry in &stage.env {
                match split_env_entry(entry) {
                    Some((key, _)) => {
                        if !seen_keys.insert(key.to_string()) {
                            errors.push(format!(
                                "{}: duplicate environment key '{}'",
                                label, key
                            ));
                        }
                        if RESERVED_ENV_KEYS.contains(&key) {
                            warnings.push(format!(
                                "{}: environment key '{}' is normally derived from a typed \
                                 stage field; the explicit entry takes precedence",
                                label, key
                            ));
                        }
                    }
                    None => errors.push(format!(
                        "{}: environment entry {:?} is not of the form KEY=VALUE",
                        label, entry
                    )),
                }
            }

            let has_next_stage_pattern = stage
                .output_pattern_next_stage
                .as_deref()
                .map_or(false, |p| !p.is_empty());

            if self.is_final_stage(index) {
                if stage.output_patterns.iter().all(|p| p.is_empty()) {
                    errors.push(format!(
                        "{}: final stage must declare at least one output pattern",
                        label
                    ));
                }
                if has_next_stage_pattern {
                    warnings.push(format!(
                        "{}: output_pattern_next_stage on the final stage has no effect",
                        label
                    ));
                }
            } else if !has_next_stage_pattern {
                errors.push(format!(
                    "{}: non-final stage must declare output_pattern_next_stage \
                     so its outputs feed stage {}",
                    label,
                    stage.stage_id + 1
                ));
            }

            for pattern in &stage.output_patterns {
                if pattern.is_empty() {
                    errors.push(format!("{}: empty output pattern", label));
                }
            }
        }

        (errors, warnings)
    }

    /// Validate a specification file without submitting anything.
    ///
    /// # Arguments
    /// * `path` - Path to the workflow specification file
    ///
    /// # Returns
    /// A `ValidationResult` containing validation status and summary
    pub fn validate_spec<P: AsRef<Path>>(path: P) -> ValidationResult {
        let mut spec = match Self::from_spec_file(&path) {
            Ok(spec) => spec,
            Err(e) => {
                return ValidationResult {
                    valid: false,
                    errors: vec![format!("Failed to parse specification file: {}", e)],
                    warnings: vec![],
                    summary: ValidationSummary::default(),
                };
            }
        };

        spec.apply_defaults();
        let (errors, warnings) = spec.validate();

        let summary = ValidationSummary {
            description: spec.description.clone(),
            monte_carlo_jobs: spec.monte_carlo,
            stage_count: spec.stages.len(),
            stage_ids: spec.stages.iter().map(|s| s.stage_id).collect(),
            jobscripts: spec
                .stages
                .iter()
                .map(|s| s.jobscript_git().unwrap_or_default())
                .collect(),
        };

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
            summary,
        }
    }

    /// Load, merge defaults, and validate in one step. This is the form the
    /// submitter consumes; errors come back as one aggregated list.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<WorkflowSpec, McflowError> {
        let mut spec = Self::from_spec_file(path)?;
        spec.apply_defaults();
        let (errors, warnings) = spec.validate();
        for warning in &warnings {
            log::warn!("{}", warning);
        }
        if !errors.is_empty() {
            return Err(McflowError::InvalidSpec(errors));
        }
        Ok(spec)
    }
}
