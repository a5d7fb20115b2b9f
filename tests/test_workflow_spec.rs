//! Tests for workflow specification loading and validation

mod common;

use common::{write_spec, FOUR_STAGE_SPEC_YAML};
use mcflow::workflow_spec::WorkflowSpec;
use rstest::rstest;
use tempfile::TempDir;

#[rstest]
fn test_four_stage_spec_parses_with_contiguous_ids() {
    let tmp = TempDir::new().unwrap();
    let path = write_spec(tmp.path(), "workflow.yaml", FOUR_STAGE_SPEC_YAML);

    let spec = WorkflowSpec::load_validated(&path).expect("spec should validate");
    assert_eq!(spec.description, "gen->reco 2 hit");
    assert_eq!(spec.monte_carlo, 20);

    let ids: Vec<i64> = spec.stages.iter().map(|s| s.stage_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    // Defaults were merged into every stage.
    for stage in &spec.stages {
        assert_eq!(stage.repo.as_deref(), Some("experiment/mc-scripts"));
        assert_eq!(stage.git_ref.as_deref(), Some("main"));
    }
    // The final stage overrode the default lifetime.
    assert_eq!(spec.stages[0].lifetime_days, Some(1));
    assert_eq!(spec.stages[3].lifetime_days, Some(90));
    assert_eq!(
        spec.stages[0].jobscript_git().as_deref(),
        Some("experiment/mc-scripts/multistep/gen.jobscript:main")
    );
}

#[rstest]
fn test_validate_spec_summary() {
    let tmp = TempDir::new().unwrap();
    let path = write_spec(tmp.path(), "workflow.yaml", FOUR_STAGE_SPEC_YAML);

    let result = WorkflowSpec::validate_spec(&path);
    assert!(result.valid, "unexpected errors: {:?}", result.errors);
    assert_eq!(result.summary.stage_count, 4);
    assert_eq!(result.summary.monte_carlo_jobs, 20);
    assert_eq!(result.summary.stage_ids, vec![1, 2, 3, 4]);
}

#[rstest]
fn test_missing_next_stage_pattern_fails_validation() {
    let spec_text = r#"
description: three stages
monte_carlo: 5
defaults:
  repo: experiment/mc-scripts
  ref: main
stages:
  - stage_id: 1
    jobscript: gen.jobscript
    wall_seconds: 3600
    rss_mib: 2000
    output_pattern_next_stage: "*_gen.root"
  - stage_id: 2
    jobscript: g4.jobscript
    wall_seconds: 3600
    rss_mib: 2000
  - stage_id: 3
    jobscript: reco.jobscript
    wall_seconds: 3600
    rss_mib: 2000
    output_patterns: ["*_reco.root"]
"#;
    let tmp = TempDir::new().unwrap();
    let path = write_spec(tmp.path(), "workflow.yaml", spec_text);

    let result = WorkflowSpec::validate_spec(&path);
    assert!(!result.valid);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("stage 2") && e.contains("output_pattern_next_stage")));
}

#[rstest]
fn test_duplicate_env_key_fails_validation() {
    let spec_text = r#"
description: dup env
monte_carlo: 5
stages:
  - stage_id: 1
    repo: experiment/mc-scripts
    ref: main
    jobscript: gen.jobscript
    wall_seconds: 3600
    rss_mib: 2000
    env:
      - NPHOTONS=10
      - NPHOTONS=20
    output_patterns: ["*_gen.root"]
"#;
    let tmp = TempDir::new().unwrap();
    let path = write_spec(tmp.path(), "workflow.yaml", spec_text);

    let result = WorkflowSpec::validate_spec(&path);
    assert!(!result.valid);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("duplicate environment key 'NPHOTONS'")));
}

#[rstest]
fn test_non_contiguous_stage_ids_fail_validation() {
    let spec_text = r#"
description: gap
monte_carlo: 5
defaults:
  repo: experiment/mc-scripts
  ref: main
stages:
  - stage_id: 1
    jobscript: gen.jobscript
    wall_seconds: 3600
    rss_mib: 2000
    output_pattern_next_stage: "*_gen.root"
  - stage_id: 3
    jobscript: reco.jobscript
    wall_seconds: 3600
    rss_mib: 2000
    output_patterns: ["*_reco.root"]
"#;
    let tmp = TempDir::new().unwrap();
    let path = write_spec(tmp.path(), "workflow.yaml", spec_text);

    let result = WorkflowSpec::validate_spec(&path);
    assert!(!result.valid);
    assert!(result.errors.iter().any(|e| e.contains("contiguous")));
}

#[rstest]
#[case("wall_seconds: 0", "wall_seconds must be positive")]
#[case("wall_seconds: -100", "wall_seconds must be positive")]
fn test_non_positive_resources_fail_validation(
    #[case] wall_line: &str,
    #[case] expected: &str,
) {
    let spec_text = format!(
        r#"
description: bad resources
monte_carlo: 5
stages:
  - stage_id: 1
    repo: experiment/mc-scripts
    ref: main
    jobscript: gen.jobscript
    {}
    rss_mib: 2000
    output_patterns: ["*_gen.root"]
"#,
        wall_line
    );
    let tmp = TempDir::new().unwrap();
    let path = write_spec(tmp.path(), "workflow.yaml", &spec_text);

    let result = WorkflowSpec::validate_spec(&path);
    assert!(!result.valid);
    assert!(result.errors.iter().any(|e| e.contains(expected)));
}

#[rstest]
fn test_unknown_field_is_rejected() {
    let spec_text = r#"
description: typo
monte_carlo: 5
stages:
  - stage_id: 1
    repo: experiment/mc-scripts
    ref: main
    jobscript: gen.jobscript
    wall_seconds: 3600
    rss_mib: 2000
    output_patterns: ["*_gen.root"]
    wall_sconds: 3600
"#;
    let tmp = TempDir::new().unwrap();
    let path = write_spec(tmp.path(), "workflow.yaml", spec_text);

    assert!(WorkflowSpec::from_spec_file(&path).is_err());
}

#[rstest]
#[case("json")]
#[case("yaml")]
fn test_round_trip_preserves_spec(#[case] format: &str) {
    let tmp = TempDir::new().unwrap();
    let path = write_spec(tmp.path(), "workflow.yaml", FOUR_STAGE_SPEC_YAML);
    let original = WorkflowSpec::from_spec_file(&path).unwrap();

    let serialized = original.to_spec_string(format).unwrap();
    let reloaded_path = write_spec(
        tmp.path(),
        &format!("roundtrip.{}", format),
        &serialized,
    );
    let reloaded = WorkflowSpec::from_spec_file(&reloaded_path).unwrap();

    assert_eq!(original, reloaded);

    // The reloaded copy validates identically.
    let mut validated = reloaded;
    validated.apply_defaults();
    let (errors, _) = validated.validate();
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

#[rstest]
fn test_extension_fallback_parses_json_content() {
    let tmp = TempDir::new().unwrap();
    let json = r#"{
        "description": "fallback",
        "monte_carlo": 1,
        "stages": [{
            "stage_id": 1,
            "repo": "experiment/mc-scripts",
            "ref": "main",
            "jobscript": "gen.jobscript",
            "wall_seconds": 3600,
            "rss_mib": 2000,
            "output_patterns": ["*_gen.root"]
        }]
    }"#;
    let path = write_spec(tmp.path(), "workflow", json);

    let spec = WorkflowSpec::from_spec_file(&path).unwrap();
    assert_eq!(spec.description, "fallback");
}

#[rstest]
fn test_missing_file_reports_path() {
    let err = WorkflowSpec::from_spec_file("/nonexistent/workflow.yaml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/workflow.yaml"));
}
