//! Command-line interface for wcgraph.
//!
//! # Examples
//!
//! Unroll a workflow and print a summary:
//!
//! ```bash
//! $ wcgraph run workflow.yml
//! ```
//!
//! Dump the full resolved graph as JSON:
//!
//! ```bash
//! $ wcgraph run workflow.yml --format json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use wcgraph_core::{CoreError, Workflow};

/// CLI arguments for wcgraph.
#[derive(Parser, Debug)]
#[command(name = "wcgraph", about = "Unroll a periodic workflow configuration into a resolved dependency graph")]
struct Cli {
    /// Raise the log filter level (-v, -vv for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Unroll a workflow configuration and report the resolved graph
    Run {
        /// Path to the workflow YAML file
        config: PathBuf,

        /// Output format for the resolved graph
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "wcgraph=info",
        1 => "wcgraph=debug,wcgraph_core=debug",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.action) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // A rejected configuration (malformed-but-well-typed input, never
            // an internal panic — Workflow::build guarantees that) is a
            // validation failure. `CoreError::Io` and anything else (a
            // missing file, CLI parsing) is a genuine internal failure.
            match err.downcast_ref::<CoreError>() {
                Some(CoreError::Io(_)) | None => {
                    eprintln!("error: {err:#}");
                    ExitCode::FAILURE
                }
                Some(_) => {
                    eprintln!("error: {err}");
                    ExitCode::from(2)
                }
            }
        }
    }
}

fn run(action: Action) -> anyhow::Result<()> {
    match action {
        Action::Run { config, format } => {
            tracing::info!(path = %config.display(), "unrolling workflow");
            let workflow = Workflow::from_yaml_file(&config)?;

            match format {
                OutputFormat::Summary => print_summary(&workflow),
                OutputFormat::Json => print_json(&workflow)?,
            }
            Ok(())
        }
    }
}

fn print_summary(workflow: &Workflow) {
    println!("workflow: {}", workflow.name);
    println!("  tasks:  {}", workflow.tasks.len());
    println!("  data:   {}", workflow.data.len());
    println!("  cycles: {}", workflow.cycles.len());
}

fn print_json(workflow: &Workflow) -> anyhow::Result<()> {
    let tasks: Vec<_> = workflow.tasks.iter().collect();
    let data: Vec<_> = workflow.data.iter().collect();
    let cycles: Vec<_> = workflow.cycles.iter().collect();
    let dump = serde_json::json!({
        "name": workflow.name,
        "tasks": tasks,
        "data": data,
        "cycles": cycles,
    });
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}
