//! Sequential workflow submission against the external service

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::errors::{McflowError, SubmissionError};
use crate::justin::JustinInterface;
use crate::workflow_spec::WorkflowSpec;

/// What a successful submission produced.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    /// Identifier assigned by the external service at creation time
    pub workflow_id: String,
    /// Number of stages created
    pub stages_created: usize,
    /// When submit-workflow returned
    pub submitted_at: DateTime<Utc>,
    /// Whether this was a dry run (nothing was actually sent)
    pub dry_run: bool,
}

/// Drives the create-workflow / create-stage / submit-workflow sequence.
///
/// The sequence is strictly ordered and aborts on the first failure. No
/// rollback is attempted: stages already created remain in the service, and
/// the error carries the workflow id so the operator can inspect or resubmit
/// it there. That mirrors the service's own recovery policy.
pub struct WorkflowSubmitter<'a> {
    justin: &'a dyn JustinInterface,
    dry_run: bool,
}

impl<'a> WorkflowSubmitter<'a> {
    pub fn new(justin: &'a dyn JustinInterface) -> Self {
        Self {
            justin,
            dry_run: false,
        }
    }

    pub fn dry_run(justin: &'a dyn JustinInterface) -> Self {
        Self {
            justin,
            dry_run: true,
        }
    }

    /// Submit a validated workflow spec.
    ///
    /// Emits exactly one create-workflow call, one create-stage call per
    /// stage in ascending stage order, and one submit-workflow call, each
    /// referencing the identifier captured from the first call.
    pub fn submit(&self, spec: &WorkflowSpec) -> Result<SubmissionReceipt, SubmissionError> {
        let workflow_id =
            self.justin
                .create_workflow(spec)
                .map_err(|source| SubmissionError {
                    workflow_id: None,
                    stages_created: 0,
                    source,
                })?;
        info!("created workflow {}", workflow_id);

        for (index, stage) in spec.stages.iter().enumerate() {
            self.justin
                .create_stage(&workflow_id, stage)
                .map_err(|source| SubmissionError {
                    workflow_id: Some(workflow_id.clone()),
                    stages_created: index,
                    source,
                })?;
            info!("created stage {} of workflow {}", stage.stage_id, workflow_id);
        }

        self.justin
            .submit_workflow(&workflow_id)
            .map_err(|source| SubmissionError {
                workflow_id: Some(workflow_id.clone()),
                stages_created: spec.stages.len(),
                source,
            })?;
        info!("submitted workflow {}", workflow_id);

        Ok(SubmissionReceipt {
            workflow_id,
            stages_created: spec.stages.len(),
            submitted_at: Utc::now(),
            dry_run: self.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow_spec::StageSpec;
    use std::cell::RefCell;

    /// Records calls and fails on a configurable call number (1-based).
    struct ScriptedJustin {
        calls: RefCell<Vec<String>>,
        fail_on_call: Option<usize>,
    }

    impl ScriptedJustin {
        fn new(fail_on_call: Option<usize>) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail_on_call,
            }
        }

        fn record(&self, call: String) -> Result<(), McflowError> {
            self.calls.borrow_mut().push(call.clone());
            if self.fail_on_call == Some(self.calls.borrow().len()) {
                return Err(McflowError::ExternalCommand {
                    command: call,
                    status: 1,
                    stderr: "simulated justin failure".to_string(),
                });
            }
            Ok(())
        }
    }

    impl JustinInterface for ScriptedJustin {
        fn create_workflow(&self, _spec: &WorkflowSpec) -> Result<String, McflowError> {
            self.record("create-workflow".to_string())?;
            Ok("4242".to_string())
        }

        fn create_stage(&self, workflow_id: &str, stage: &StageSpec) -> Result<(), McflowError> {
            self.record(format!("create-stage {} {}", workflow_id, stage.stage_id))
        }

        fn submit_workflow(&self, workflow_id: &str) -> Result<(), McflowError> {
            self.record(format!("submit-workflow {}", workflow_id))
        }

        fn show_stages(&self, _workflow_id: &str) -> Result<String, McflowError> {
            Ok(String::new())
        }

        fn show_jobs(&self, _: &str, _: Option<i64>) -> Result<String, McflowError> {
            Ok(String::new())
        }

        fn show_files(&self, _: &str, _: Option<i64>) -> Result<String, McflowError> {
            Ok(String::new())
        }

        fn show_replicas(&self, _: &str, _: Option<i64>) -> Result<String, McflowError> {
            Ok(String::new())
        }
    }

    fn four_stage_spec() -> WorkflowSpec {
        let stages = (1..=4)
            .map(|stage_id| StageSpec {
                stage_id,
                repo: Some("experiment/mc-scripts".to_string()),
                jobscript: Some(format!("stage{}.jobscript", stage_id)),
                git_ref: Some("main".to_string()),
                wall_seconds: Some(14400),
                rss_mib: Some(4000),
                output_pattern_next_stage: if stage_id < 4 {
                    Some(format!("*_s{}.root", stage_id))
                } else {
                    None
                },
                output_patterns: if stage_id == 4 {
                    vec!["*_reco.root".to_string()]
                } else {
                    Vec::new()
                },
                ..StageSpec::default()
            })
            .collect();
        WorkflowSpec {
            description: "gen->reco".to_string(),
            monte_carlo: 20,
            campaign: None,
            defaults: None,
            stages,
        }
    }

    #[test]
    fn submits_stages_in_order_with_captured_id() {
        let justin = ScriptedJustin::new(None);
        let receipt = WorkflowSubmitter::new(&justin)
            .submit(&four_stage_spec())
            .unwrap();

        assert_eq!(receipt.workflow_id, "4242");
        assert_eq!(receipt.stages_created, 4);
        assert_eq!(
            *justin.calls.borrow(),
            vec![
                "create-workflow",
                "create-stage 4242 1",
                "create-stage 4242 2",
                "create-stage 4242 3",
                "create-stage 4242 4",
                "submit-workflow 4242",
            ]
        );
    }

    #[test]
    fn aborts_on_failed_stage_creation() {
        // Call 3 is the second create-stage.
        let justin = ScriptedJustin::new(Some(3));
        let err = WorkflowSubmitter::new(&justin)
            .submit(&four_stage_spec())
            .unwrap_err();

        assert_eq!(err.workflow_id.as_deref(), Some("4242"));
        assert_eq!(err.stages_created, 1);
        assert!(err.source.to_string().contains("simulated justin failure"));
        // Nothing after the failing call, in particular no submit-workflow.
        assert_eq!(justin.calls.borrow().len(), 3);
        assert!(!justin
            .calls
            .borrow()
            .iter()
            .any(|c| c.starts_with("submit-workflow")));
    }

    #[test]
    fn reports_missing_id_when_creation_fails() {
        let justin = ScriptedJustin::new(Some(1));
        let err = WorkflowSubmitter::new(&justin)
            .submit(&four_stage_spec())
            .unwrap_err();
        assert!(err.workflow_id.is_none());
        assert_eq!(err.stages_created, 0);
    }
}
