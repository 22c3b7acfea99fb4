//! Gatekeeper CLI entrypoint.

use clap::{Parser, ValueEnum};
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;
mod output;

use commands::{Commands, ConfigCommands};
use config::CliConfig;

/// Exit code for malformed input: bad YAML, bad needs JSON, failed validation.
const EXIT_INVALID: u8 = 2;

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(author, version, about = "Validate, run and gate CI workflows", long_about = None)]
struct Cli {
    /// Log line format (filter with RUST_LOG)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = CliConfig::load().unwrap_or_default();

    let outcome = match cli.command {
        Commands::Check(args) => handlers::check(&config, args),
        Commands::Validate { path } => handlers::validate(&config, path),
        Commands::Plan(args) => handlers::plan(&config, args),
        Commands::Run(args) => handlers::run(&config, args).await,
        Commands::Schema => handlers::schema(),
        Commands::Init { path, force } => handlers::init(&config, path, force),
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config),
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value),
        },
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            ExitCode::from(EXIT_INVALID)
        }
    }
}
