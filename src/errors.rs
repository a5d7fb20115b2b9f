//! Error types for the mcflow client

use thiserror::Error;

/// Errors produced while loading specs or talking to the external service
#[derive(Error, Debug)]
pub enum McflowError {
    /// The workflow specification failed validation. Carries the full list of
    /// problems found in a single pass so the operator can fix them together.
    #[error("invalid workflow specification:\n  {}", .0.join("\n  "))]
    InvalidSpec(Vec<String>),

    #[error("failed to read specification file {path}: {source}")]
    SpecIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse specification file {path}: {message}")]
    SpecParse { path: String, message: String },

    /// The external tool could not be launched at all (not installed, not on
    /// PATH, no execute permission).
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The external tool ran and exited non-zero. The stderr text is passed
    /// through unmodified; justIN's own diagnostics are the authoritative
    /// description of what went wrong.
    #[error("`{command}` exited with status {status}: {stderr}")]
    ExternalCommand {
        command: String,
        status: i32,
        stderr: String,
    },

    /// The external tool exited zero but its output did not contain what the
    /// contract promises (e.g. no workflow id after create-workflow).
    #[error("could not parse a workflow id from create-workflow output: {output:?}")]
    MissingWorkflowId { output: String },

    #[error("unexpected output from `{command}`: {message}")]
    UnexpectedOutput { command: String, message: String },
}

/// Raised when the submission sequence aborts partway through.
///
/// If create-workflow succeeded before the failure, `workflow_id` holds the
/// identifier so the operator can inspect or resubmit it with the external
/// service's own commands. Nothing is rolled back locally.
#[derive(Debug, Error)]
pub struct SubmissionError {
    pub workflow_id: Option<String>,
    pub stages_created: usize,
    #[source]
    pub source: McflowError,
}

impl std::fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.workflow_id {
            Some(id) => write!(
                f,
                "workflow submission aborted after {} of the stages were created \
                 (workflow {} exists in the service and can be inspected or resubmitted): {}",
                self.stages_created, id, self.source
            ),
            None => write!(
                f,
                "workflow submission aborted before a workflow was created: {}",
                self.source
            ),
        }
    }
}
