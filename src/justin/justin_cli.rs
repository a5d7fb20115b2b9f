//! justIN command-line tool invocation

use std::env;
use std::process::Command;

use log::{debug, trace};

use crate::errors::McflowError;
use crate::workflow_spec::{
    split_env_entry, StageSpec, WorkflowSpec, DEFAULT_SOFTWARE_VERSION,
};

use super::justin_interface::JustinInterface;

/// Options controlling how the `justin` tool is invoked
#[derive(Clone, Debug)]
pub struct JustinOptions {
    /// Executable name or path of the justin CLI
    pub justin_bin: String,
    /// Value for justin's --instance flag
    pub instance: Option<String>,
    /// Value for justin's --url flag
    pub url: Option<String>,
    /// Pass -v to justin
    pub verbose: bool,
    /// When set, wrap every invocation in `bash -lc` sourcing this
    /// environment bootstrap script and running `setup justin` first
    pub env_setup_script: Option<String>,
    /// Print each command without executing it
    pub dry_run: bool,
}

impl Default for JustinOptions {
    fn default() -> Self {
        Self {
            justin_bin: "justin".to_string(),
            instance: None,
            url: None,
            verbose: false,
            env_setup_script: None,
            dry_run: false,
        }
    }
}

/// Implementation of [`JustinInterface`] that shells out to the justin CLI.
///
/// Each operation is one blocking subprocess invocation. There is no local
/// retry or backoff: justIN itself owns execution-level reliability, and a
/// failed submission sequence is safe to rerun through the service's own
/// commands.
pub struct JustinCli {
    options: JustinOptions,
}

impl JustinCli {
    pub fn new(options: JustinOptions) -> Self {
        Self { options }
    }

    /// Workflow-id placeholder reported in dry-run mode.
    pub const DRY_RUN_WORKFLOW_ID: &'static str = "DRYRUN_WFID";

    /// Get the justin executable path (allows for testing with fake binary)
    fn get_justin_exec(&self) -> String {
        env::var("MCFLOW_FAKE_JUSTIN").unwrap_or_else(|_| self.options.justin_bin.clone())
    }

    /// Global flags inserted before every subcommand.
    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.options.verbose {
            args.push("-v".to_string());
        }
        if let Some(instance) = &self.options.instance {
            args.push("--instance".to_string());
            args.push(instance.clone());
        }
        if let Some(url) = &self.options.url {
            args.push("--url".to_string());
            args.push(url.clone());
        }
        args
    }

    /// Run one justin subcommand, echoing the command line first.
    ///
    /// Returns (status, stdout, stderr). In dry-run mode nothing is executed
    /// and a successful empty result is returned.
    fn run(&self, args: &[String]) -> Result<(i32, String, String), McflowError> {
        let justin = self.get_justin_exec();
        let mut argv: Vec<String> = vec![justin.clone()];
        argv.extend(self.global_args());
        argv.extend(args.iter().cloned());

        let printable = argv
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ");
        println!("+ {}", printable);

        if self.options.dry_run {
            return Ok((0, String::new(), String::new()));
        }

        let output = if let Some(setup) = &self.options.env_setup_script {
            // `setup justin` is a shell function that only exists after
            // sourcing the bootstrap script, so the whole invocation has to
            // go through a login shell.
            let cmd_str = format!(
                "source {} >/dev/null 2>&1; setup justin >/dev/null 2>&1; {}",
                shell_quote(setup),
                printable
            );
            trace!("bash -lc {:?}", cmd_str);
            Command::new("bash").args(["-lc", &cmd_str]).output()
        } else {
            trace!("exec {:?}", argv);
            Command::new(&argv[0]).args(&argv[1..]).output()
        };

        let output = output.map_err(|e| McflowError::Spawn {
            command: justin,
            source: e,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let status = output.status.code().unwrap_or(-1);
        debug!("justin exited with status {}", status);

        Ok((status, stdout, stderr))
    }

    /// Run a subcommand and turn a non-zero exit into an error carrying the
    /// tool's stderr verbatim.
    fn run_checked(&self, subcommand: &str, args: &[String]) -> Result<String, McflowError> {
        let (status, stdout, stderr) = self.run(args)?;
        if status != 0 {
            return Err(McflowError::ExternalCommand {
                command: subcommand.to_string(),
                status,
                stderr,
            });
        }
        Ok(stdout)
    }

    /// Build the argument list for one create-stage call.
    fn stage_args(workflow_id: &str, stage: &StageSpec) -> Result<Vec<String>, McflowError> {
        let jobscript_git = stage.jobscript_git().ok_or_else(|| {
            McflowError::InvalidSpec(vec![format!(
                "stage {}: repo, jobscript, and ref must all be set before submission",
                stage.stage_id
            )])
        })?;

        let mut args = vec![
            "create-stage".to_string(),
            "--workflow-id".to_string(),
            workflow_id.to_string(),
            "--stage-id".to_string(),
            stage.stage_id.to_string(),
            "--jobscript-git".to_string(),
            jobscript_git,
        ];

        if let Some(wall) = stage.wall_seconds {
            args.push("--wall-seconds".to_string());
            args.push(wall.to_string());
        }
        if let Some(rss) = stage.rss_mib {
            args.push("--rss-mib".to_string());
            args.push(rss.to_string());
        }
        if let Some(processors) = stage.processors {
            args.push("--processors".to_string());
            args.push(processors.to_string());
        }
        if stage.gpu.unwrap_or(false) {
            args.push("--gpu".to_string());
        }

        let mut push_env = |entry: String| {
            args.push("--env".to_string());
            args.push(entry);
        };

        for entry in &stage.env {
            push_env(entry.clone());
        }

        // Derived assignments for the job-script execution contract. An
        // explicit env entry for the same key takes precedence.
        let explicit_keys: Vec<&str> = stage
            .env
            .iter()
            .filter_map(|e| split_env_entry(e).map(|(k, _)| k))
            .collect();
        let mut push_derived = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                if !explicit_keys.contains(&key) {
                    push_env(format!("{}={}", key, value));
                }
            }
        };

        push_derived("NEVENTS", stage.events_per_job.map(|n| n.to_string()));
        push_derived("JOB_FHICL_FILE", stage.fhicl_file.clone());
        push_derived("INPUT_TAR_DIR_LOCAL", stage.tarball_dir.clone());
        push_derived(
            "DUNESW_VERSION",
            Some(
                stage
                    .software_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SOFTWARE_VERSION.to_string()),
            ),
        );
        push_derived("FCL_TGZ_URL", stage.fhicl_bundle_url.clone());

        if let Some(pattern) = &stage.output_pattern_next_stage {
            if !pattern.is_empty() {
                args.push("--output-pattern-next-stage".to_string());
                args.push(pattern.clone());
            }
        }
        for pattern in &stage.output_patterns {
            args.push("--output-pattern".to_string());
            args.push(pattern.clone());
        }
        if let Some(rse) = &stage.output_rse {
            args.push("--output-rse".to_string());
            args.push(rse.clone());
        }
        if let Some(expression) = &stage.output_rse_expression {
            args.push("--output-rse-expression".to_string());
            args.push(expression.clone());
        }
        if let Some(days) = stage.lifetime_days {
            args.push("--lifetime-days".to_string());
            args.push(days.to_string());
        }
        if let Some(distance) = stage.max_distance {
            args.push("--max-distance".to_string());
            args.push(distance.to_string());
        }
        if let Some(sites) = &stage.sites {
            for site in sites {
                args.push("--site".to_string());
                args.push(site.clone());
            }
        }
        if let Some(classads) = &stage.classads {
            for classad in classads {
                args.push("--classad".to_string());
                args.push(classad.clone());
            }
        }

        Ok(args)
    }

    fn show(
        &self,
        subcommand: &str,
        workflow_id: &str,
        stage_id: Option<i64>,
    ) -> Result<String, McflowError> {
        let mut args = vec![
            subcommand.to_string(),
            "--workflow-id".to_string(),
            workflow_id.to_string(),
        ];
        if let Some(stage) = stage_id {
            args.push("--stage-id".to_string());
            args.push(stage.to_string());
        }
        self.run_checked(subcommand, &args)
    }
}

impl JustinInterface for JustinCli {
    fn create_workflow(&self, spec: &WorkflowSpec) -> Result<String, McflowError> {
        let mut args = vec![
            "create-workflow".to_string(),
            "--description".to_string(),
            spec.description.clone(),
            "--monte-carlo".to_string(),
            spec.monte_carlo.to_string(),
        ];
        if let Some(campaign) = &spec.campaign {
            args.push("--scope".to_string());
            args.push(campaign.clone());
        }

        let stdout = self.run_checked("create-workflow", &args)?;
        if self.options.dry_run {
            return Ok(Self::DRY_RUN_WORKFLOW_ID.to_string());
        }
        parse_workflow_id(&stdout)
    }

    fn create_stage(&self, workflow_id: &str, stage: &StageSpec) -> Result<(), McflowError> {
        let args = Self::stage_args(workflow_id, stage)?;
        self.run_checked("create-stage", &args)?;
        Ok(())
    }

    fn submit_workflow(&self, workflow_id: &str) -> Result<(), McflowError> {
        let args = vec![
            "submit-workflow".to_string(),
            "--workflow-id".to_string(),
            workflow_id.to_string(),
        ];
        self.run_checked("submit-workflow", &args)?;
        Ok(())
    }

    fn show_stages(&self, workflow_id: &str) -> Result<String, McflowError> {
        self.show("show-stages", workflow_id, None)
    }

    fn show_jobs(&self, workflow_id: &str, stage_id: Option<i64>) -> Result<String, McflowError> {
        self.show("show-jobs", workflow_id, stage_id)
    }

    fn show_files(&self, workflow_id: &str, stage_id: Option<i64>) -> Result<String, McflowError> {
        self.show("show-files", workflow_id, stage_id)
    }

    fn show_replicas(
        &self,
        workflow_id: &str,
        stage_id: Option<i64>,
    ) -> Result<String, McflowError> {
        self.show("show-replicas", workflow_id, stage_id)
    }
}

/// Extract the workflow id from create-workflow output.
///
/// Some justin versions print extra text after the id, so only the first
/// whitespace token is considered, and it must be entirely numeric.
pub fn parse_workflow_id(stdout: &str) -> Result<String, McflowError> {
    let token = stdout.split_whitespace().next().unwrap_or("");
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        Ok(token.to_string())
    } else {
        Err(McflowError::MissingWorkflowId {
            output: stdout.to_string(),
        })
    }
}

/// Quote a string for safe interpolation into a POSIX shell command line.
fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}
