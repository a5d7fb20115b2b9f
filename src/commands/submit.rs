//! Workflow submission and validation commands

use std::path::Path;

use log::warn;

use crate::commands::{print_error, print_json, EXIT_CONFIG_ERROR, EXIT_EXTERNAL_ERROR};
use crate::errors::McflowError;
use crate::justin::JustinInterface;
use crate::submitter::WorkflowSubmitter;
use crate::workflow_spec::WorkflowSpec;

/// Load, validate, and submit a workflow specification.
///
/// Exits 2 on local spec errors (nothing reaches the service), 1 when an
/// external call fails (the partially-created workflow id, if any, is part of
/// the error text).
pub fn handle_submit(
    justin: &dyn JustinInterface,
    spec_path: &Path,
    dry_run: bool,
    format: &str,
) {
    let spec = match WorkflowSpec::load_validated(spec_path) {
        Ok(spec) => spec,
        Err(e) => {
            let code = match e {
                McflowError::InvalidSpec(_)
                | McflowError::SpecIo { .. }
                | McflowError::SpecParse { .. } => EXIT_CONFIG_ERROR,
                _ => EXIT_EXTERNAL_ERROR,
            };
            print_error("loading workflow specification", &e);
            std::process::exit(code);
        }
    };

    let submitter = if dry_run {
        WorkflowSubmitter::dry_run(justin)
    } else {
        WorkflowSubmitter::new(justin)
    };

    let receipt = match submitter.submit(&spec) {
        Ok(receipt) => receipt,
        Err(e) => {
            print_error("submitting workflow", &e);
            std::process::exit(EXIT_EXTERNAL_ERROR);
        }
    };

    if format == "json" {
        print_json(&receipt);
    } else if dry_run {
        println!(
            "Dry run complete: {} stage(s) would be submitted",
            receipt.stages_created
        );
    } else {
        println!("Submitted workflow {}", receipt.workflow_id);
    }

    // Post-submission stage listing, best effort only: the workflow is
    // already submitted, so a failure here is not a submission failure.
    if !dry_run {
        match justin.show_stages(&receipt.workflow_id) {
            Ok(listing) => {
                if !listing.trim().is_empty() {
                    println!("{}", listing);
                }
            }
            Err(e) => warn!("could not list stages after submission: {}", e),
        }
    }
}

/// Validate a specification file without talking to the service at all.
pub fn handle_validate(spec_path: &Path, format: &str) {
    let result = WorkflowSpec::validate_spec(spec_path);

    if format == "json" {
        print_json(&result);
    } else {
        if result.valid {
            println!(
                "{} is valid: {} stage(s), {} Monte Carlo job(s)",
                spec_path.display(),
                result.summary.stage_count,
                result.summary.monte_carlo_jobs
            );
            for (stage_id, jobscript) in result
                .summary
                .stage_ids
                .iter()
                .zip(result.summary.jobscripts.iter())
            {
                println!("  stage {}: {}", stage_id, jobscript);
            }
        } else {
            println!("{} is INVALID", spec_path.display());
            for error in &result.errors {
                println!("  error: {}", error);
            }
        }
        for warning in &result.warnings {
            println!("  warning: {}", warning);
        }
    }

    if !result.valid {
        std::process::exit(EXIT_CONFIG_ERROR);
    }
}
