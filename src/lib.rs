//! Client for submitting multi-stage Monte Carlo workflows to justIN
//!
//! This crate contains all client-side functionality: the declarative
//! workflow specification and its validation, the sequential submitter that
//! drives the external justIN CLI, and the read-only status and statistics
//! commands.
//!
//! justIN itself — scheduling, file cataloguing, retries, failure recovery —
//! is an external collaborator reached only through its command-line tool.
//! Nothing in this crate duplicates that machinery.

pub mod commands;
pub mod config;
pub mod errors;
pub mod justin;
pub mod report_models;
pub mod reports;
pub mod submitter;
pub mod workflow_spec;

// Re-exports for convenience
pub use config::{ClientConfig, ConfigPaths, McflowConfig};
pub use errors::{McflowError, SubmissionError};
pub use justin::{JustinCli, JustinInterface, JustinOptions};
pub use submitter::{SubmissionReceipt, WorkflowSubmitter};
pub use workflow_spec::{
    StageDefaults, StageSpec, ValidationResult, ValidationSummary, WorkflowSpec,
};

// Report model types for inter-command data sharing
pub use report_models::{DistributionSummary, JobRecord, StageStatistics, WorkflowStatistics};
