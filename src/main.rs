//! mcflow - submit and monitor multi-stage Monte Carlo workflows on justIN

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mcflow::commands::show::{handle_show_commands, ShowCommands};
use mcflow::commands::stats::handle_stats;
use mcflow::commands::submit::{handle_submit, handle_validate};
use mcflow::commands::{print_error, EXIT_CONFIG_ERROR};
use mcflow::config::McflowConfig;
use mcflow::justin::{JustinCli, JustinOptions};

#[derive(Parser)]
#[command(name = "mcflow", version)]
#[command(about = "Submit and monitor multi-stage Monte Carlo workflows on justIN")]
#[command(after_long_help = "\
EXAMPLES:
    # Validate a workflow spec without submitting
    mcflow validate production.yaml

    # Submit a workflow
    mcflow submit --config production.yaml

    # See the justin commands a submission would run
    mcflow submit --config production.yaml --dry-run

    # Inspect a submitted workflow
    mcflow show stages 12080
    mcflow stats 12080 --stage-id 2 --csv stage2.csv
")]
struct Cli {
    /// Output format (table or json)
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// justIN instance name, passed through as --instance
    #[arg(long, global = true)]
    instance: Option<String>,

    /// justIN service URL, passed through as --url
    #[arg(long, global = true)]
    url: Option<String>,

    /// Name or path of the justin executable
    #[arg(long, global = true)]
    justin_bin: Option<String>,

    /// Run each justin call under the grid environment bootstrap
    /// (bash -lc 'source setup_dune.sh; setup justin; ...')
    #[arg(long, global = true)]
    with_env_setup: bool,

    /// Debug logging locally and -v on the justin CLI
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow specification file and submit it
    Submit {
        /// Path to the workflow specification (JSON or YAML)
        #[arg(short, long)]
        config: PathBuf,
        /// Print the justin commands without executing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a workflow specification file without submitting
    Validate {
        /// Path to the workflow specification (JSON or YAML)
        #[arg()]
        file: PathBuf,
    },
    /// Read-only listings from the workflow service
    #[command(subcommand)]
    Show(ShowCommands),
    /// Aggregate per-stage job statistics for a workflow
    Stats {
        /// Workflow id assigned by the service at creation time
        #[arg()]
        workflow_id: String,
        /// Restrict the report to one stage
        #[arg(long)]
        stage_id: Option<i64>,
        /// Also write one CSV row per job to this path
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match McflowConfig::load() {
        Ok(config) => config,
        Err(e) => {
            print_error("loading configuration", &format!("{:#}", e));
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    // Command-line flags override anything from the config files.
    if let Some(format) = &cli.format {
        config.client.format = format.clone();
    }
    if let Some(instance) = &cli.instance {
        config.client.instance = Some(instance.clone());
    }
    if let Some(url) = &cli.url {
        config.client.url = Some(url.clone());
    }
    if let Some(justin_bin) = &cli.justin_bin {
        config.client.justin_bin = justin_bin.clone();
    }
    if cli.with_env_setup {
        config.client.with_env_setup = true;
    }

    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.client.log_level.clone()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&log_level)).init();

    let dry_run = matches!(
        cli.command,
        Commands::Submit { dry_run: true, .. }
    );
    let justin = JustinCli::new(JustinOptions {
        justin_bin: config.client.justin_bin.clone(),
        instance: config.client.instance.clone(),
        url: config.client.url.clone(),
        verbose: cli.verbose,
        env_setup_script: config
            .client
            .with_env_setup
            .then(|| config.client.env_setup_script.clone()),
        dry_run,
    });
    let format = config.client.format.as_str();

    match &cli.command {
        Commands::Submit { config, dry_run } => {
            handle_submit(&justin, config, *dry_run, format);
        }
        Commands::Validate { file } => {
            handle_validate(file, format);
        }
        Commands::Show(command) => {
            handle_show_commands(&justin, command);
        }
        Commands::Stats {
            workflow_id,
            stage_id,
            csv,
        } => {
            handle_stats(&justin, workflow_id, *stage_id, csv.as_deref(), format);
        }
    }
}
