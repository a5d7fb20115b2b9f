//! Read-only listing commands
//!
//! Thin passthrough of the external tool's tabular output. The service owns
//! the formats; mcflow only decides which listing to ask for.

use clap::Subcommand;

use crate::commands::{print_error, EXIT_EXTERNAL_ERROR};
use crate::justin::JustinInterface;

#[derive(Subcommand)]
#[command(after_long_help = "\
EXAMPLES:
    # List the stages of a workflow
    mcflow show stages 12080

    # List jobs of one stage
    mcflow show jobs 12080 --stage-id 2

    # List output files and their replicas
    mcflow show files 12080
    mcflow show replicas 12080
")]
pub enum ShowCommands {
    /// List the stages of a workflow
    Stages {
        /// Workflow id assigned by the service at creation time
        #[arg()]
        workflow_id: String,
    },
    /// List the jobs of a workflow
    Jobs {
        #[arg()]
        workflow_id: String,
        /// Restrict the listing to one stage
        #[arg(long)]
        stage_id: Option<i64>,
    },
    /// List the files of a workflow
    Files {
        #[arg()]
        workflow_id: String,
        /// Restrict the listing to one stage
        #[arg(long)]
        stage_id: Option<i64>,
    },
    /// List the stored replicas of a workflow's files
    Replicas {
        #[arg()]
        workflow_id: String,
        /// Restrict the listing to one stage
        #[arg(long)]
        stage_id: Option<i64>,
    },
}

pub fn handle_show_commands(justin: &dyn JustinInterface, command: &ShowCommands) {
    let result = match command {
        ShowCommands::Stages { workflow_id } => justin.show_stages(workflow_id),
        ShowCommands::Jobs {
            workflow_id,
            stage_id,
        } => justin.show_jobs(workflow_id, *stage_id),
        ShowCommands::Files {
            workflow_id,
            stage_id,
        } => justin.show_files(workflow_id, *stage_id),
        ShowCommands::Replicas {
            workflow_id,
            stage_id,
        } => justin.show_replicas(workflow_id, *stage_id),
    };

    match result {
        Ok(listing) => print!("{}", listing),
        Err(e) => {
            print_error("querying the workflow service", &e);
            std::process::exit(EXIT_EXTERNAL_ERROR);
        }
    }
}
