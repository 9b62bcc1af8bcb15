mod commands;
mod config;
mod outbox;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use pipeline_core::{ExecutionState, JobState, ReportStatus, Stage};

use crate::commands::Context;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Pipeline job orchestration and status tracking.
#[derive(Parser)]
#[command(
    name = "pipeline",
    version,
    about = "Pipeline job orchestration and status tracking"
)]
struct Cli {
    /// Directory holding the pipeline state store
    #[arg(long, global = true, default_value = ".pipeline")]
    state_dir: PathBuf,

    /// Path to the deployment configuration
    #[arg(long, global = true, default_value = "pipeline.toml")]
    config: PathBuf,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log debug detail to stderr (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report and inspect job status
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Record and inspect report results
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },

    /// Publish and resolve shared resource identifiers
    Registry {
        #[command(subcommand)]
        command: RegistryCommands,
    },

    /// Store and look up topics
    Topic {
        #[command(subcommand)]
        command: TopicCommands,
    },

    /// Provision stage containers and check access
    Stages {
        #[command(subcommand)]
        command: StagesCommands,
    },

    /// Evaluate crawl triggers
    Trigger {
        #[command(subcommand)]
        command: TriggerCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum JobCommands {
    /// Record a job's state and last response (best-effort)
    Update {
        job_id: String,
        #[arg(long)]
        project: String,
        /// PENDING, RUNNING, SUCCEEDED or FAILED
        #[arg(long)]
        state: JobState,
        /// Worker response as JSON, stored as-is
        #[arg(long)]
        response: Option<String>,
    },

    /// Show one job record
    Get {
        job_id: String,
        #[arg(long)]
        project: String,
    },

    /// List a project's jobs
    List {
        #[arg(long)]
        project: String,
        /// Only jobs in this state
        #[arg(long)]
        state: Option<JobState>,
    },
}

#[derive(Subcommand)]
pub(crate) enum ReportCommands {
    /// Overwrite a report record with the given values (best-effort)
    Append {
        correlation_id: String,
        #[arg(long = "type")]
        report_type: String,
        /// Output file; repeat for several
        #[arg(long = "file")]
        files: Vec<String>,
        /// IN_PROGRESS, COMPLETE or FAILED
        #[arg(long)]
        status: ReportStatus,
        #[arg(long)]
        subject: String,
    },

    /// Merge one part into a report, completing it at the expected count
    AddPart {
        correlation_id: String,
        #[arg(long = "type")]
        report_type: String,
        #[arg(long = "file")]
        files: Vec<String>,
        /// Number of files that make the report complete
        #[arg(long)]
        expected: usize,
        #[arg(long)]
        subject: String,
    },

    /// Show one report record
    Get {
        correlation_id: String,
        #[arg(long = "type")]
        report_type: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum RegistryCommands {
    /// Publish a value under a logical name
    Publish { name: String, value: String },

    /// Resolve a logical name
    Resolve { name: String },

    /// List every name published in the deployment scope
    List,
}

#[derive(Subcommand)]
pub(crate) enum TopicCommands {
    /// Store a topic record
    Put {
        topic_id: String,
        /// Topic fields as a JSON object
        #[arg(long, default_value = "{}")]
        fields: String,
    },

    /// Look up a topic by id
    Get { topic_id: String },
}

#[derive(Subcommand)]
pub(crate) enum StagesCommands {
    /// Lay out a project's stage containers, apply configured grants, and
    /// publish the container names
    Provision { project: String },

    /// Check that a principal may move data between two stages
    Check {
        project: String,
        #[arg(long)]
        principal: String,
        #[arg(long)]
        from: Stage,
        #[arg(long)]
        to: Stage,
    },
}

#[derive(Subcommand)]
pub(crate) enum TriggerCommands {
    /// Deliver one completion event to a configured trigger
    Fire {
        /// Trigger name from the configuration
        trigger: String,
        /// Unit whose state changed
        #[arg(long)]
        unit: String,
        /// Upstream run id
        #[arg(long)]
        run_id: String,
        /// New state of the unit
        #[arg(long)]
        state: ExecutionState,
        /// Current state of another unit, as unit=STATE; repeat for several
        #[arg(long, value_parser = parse_observed)]
        observed: Vec<(String, ExecutionState)>,
        /// Fire at most once per upstream run even if the trigger is not
        /// configured to
        #[arg(long)]
        deduplicate: bool,
    },
}

fn parse_observed(s: &str) -> Result<(String, ExecutionState), String> {
    let (unit, state) = s
        .split_once('=')
        .ok_or_else(|| format!("expected unit=STATE, got '{}'", s))?;
    let state = state.parse::<ExecutionState>().map_err(|e| e.to_string())?;
    Ok((unit.to_string(), state))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match config::read_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            report_error(&e, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    if let Err(errors) = config::validate_config(&config) {
        for e in &errors {
            report_error(&format!("invalid configuration: {}", e), cli.output, cli.quiet);
        }
        process::exit(1);
    }

    let ctx = Context::new(cli.state_dir, config, cli.output, cli.quiet);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), cli.output, cli.quiet);
            process::exit(1);
        }
    };

    runtime.block_on(async {
        match cli.command {
            Commands::Job { command } => commands::job::run(command, &ctx).await,
            Commands::Report { command } => commands::report::run(command, &ctx).await,
            Commands::Registry { command } => commands::registry::run(command, &ctx).await,
            Commands::Topic { command } => commands::topic::run(command, &ctx).await,
            Commands::Stages { command } => commands::stages::run(command, &ctx).await,
            Commands::Trigger { command } => commands::trigger::run(command, &ctx).await,
        }
    });
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
