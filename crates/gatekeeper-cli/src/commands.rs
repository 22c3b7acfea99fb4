//! CLI command definitions.

use crate::config::OutputFormat;
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate the aggregation gate over dependency results
    Check(CheckArgs),

    /// Validate a workflow file
    Validate {
        /// Path to workflow file (defaults to the configured workflow)
        path: Option<PathBuf>,
    },

    /// Show job groups in dependency order with their matrix variants
    Plan(PlanArgs),

    /// Run a workflow locally
    Run(RunArgs),

    /// Print the JSON Schema of the workflow format
    Schema,

    /// Write a starter workflow with an always-running gate job
    Init {
        /// Where to write the workflow (defaults to the configured workflow)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args)]
pub struct CheckArgs {
    /// Needs JSON, as rendered by `toJSON(needs)`: inline, `@file`, or `-` for stdin
    #[arg(long)]
    pub needs: Option<String>,

    /// Dependency result (repeatable)
    #[arg(long = "result", value_name = "NAME=RESULT")]
    pub results: Vec<String>,

    /// Dependency that must be reported (repeatable)
    #[arg(long = "require", value_name = "NAME")]
    pub required: Vec<String>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Path to workflow file (defaults to the configured workflow)
    pub path: Option<PathBuf>,

    /// Workflow input (repeatable)
    #[arg(long = "input", value_name = "NAME=VALUE")]
    pub inputs: Vec<String>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to workflow file (defaults to the configured workflow)
    pub path: Option<PathBuf>,

    /// Triggering event
    #[arg(long, default_value = "pull_request")]
    pub event: String,

    /// Branch or tag name the run is for
    #[arg(long = "ref", value_name = "REF")]
    pub ref_name: Option<String>,

    /// Workflow input (repeatable)
    #[arg(long = "input", value_name = "NAME=VALUE")]
    pub inputs: Vec<String>,

    /// Secret to forward, read from the environment variable of the same name (repeatable)
    #[arg(long = "secret", value_name = "NAME")]
    pub secrets: Vec<String>,

    /// Report scripted results from this YAML file instead of running steps
    #[arg(long)]
    pub outcomes: Option<PathBuf>,

    /// Job whose needs decide the run's verdict
    #[arg(long)]
    pub gate: Option<String>,

    /// Working directory for steps
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Maximum concurrently running jobs
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
}
