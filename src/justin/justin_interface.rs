//! Trait describing the operations mcflow needs from the workflow service

use crate::errors::McflowError;
use crate::workflow_spec::{StageSpec, WorkflowSpec};

/// Operations against the external workflow service.
///
/// The first three mutate service state and are invoked in a fixed order by
/// the submitter; the `show_*` calls are read-only and return the tool's
/// tabular text untouched. Every call blocks until the external tool exits.
pub trait JustinInterface {
    /// Register a new workflow and return the identifier the service assigned.
    /// That identifier is the sole durable handle for all later calls.
    fn create_workflow(&self, spec: &WorkflowSpec) -> Result<String, McflowError>;

    /// Add one stage to an existing workflow.
    fn create_stage(&self, workflow_id: &str, stage: &StageSpec) -> Result<(), McflowError>;

    /// Hand the workflow over for execution.
    fn submit_workflow(&self, workflow_id: &str) -> Result<(), McflowError>;

    /// Tabular listing of the workflow's stages.
    fn show_stages(&self, workflow_id: &str) -> Result<String, McflowError>;

    /// Tabular listing of jobs, optionally restricted to one stage.
    fn show_jobs(&self, workflow_id: &str, stage_id: Option<i64>) -> Result<String, McflowError>;

    /// Tabular listing of files, optionally restricted to one stage.
    fn show_files(&self, workflow_id: &str, stage_id: Option<i64>) -> Result<String, McflowError>;

    /// Tabular listing of file replicas, optionally restricted to one stage.
    fn show_replicas(
        &self,
        workflow_id: &str,
        stage_id: Option<i64>,
    ) -> Result<String, McflowError>;
}
