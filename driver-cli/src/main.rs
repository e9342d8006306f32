mod commands;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use pipeline_driver::{Driver, DriverConfig, MemoryStore, ProviderRegistry};

/// Pipeline execution driver
#[derive(Parser, Debug)]
#[command(name = "pipeline-driver", version, about)]
struct Cli {
    /// Driver config file (YAML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level filter, overriding RUST_LOG (e.g. debug, pipeline_driver=trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the executor plugin endpoint
    Serve(commands::serve::ServeArgs),

    /// Run one template request from a JSON file and print the reply
    Execute(commands::execute::ExecuteArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = match &cli.config {
        Some(path) => DriverConfig::from_file(path)?,
        None => DriverConfig::default(),
    };
    let driver = Arc::new(build_driver(config)?);

    match cli.command {
        Command::Serve(args) => commands::serve::execute(args, driver).await,
        Command::Execute(args) => commands::execute::execute(args, driver).await,
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_driver(config: DriverConfig) -> Result<Driver> {
    let registry = ProviderRegistry::new();
    let run_registration =
        registry.create(&config.run_registration_provider, &serde_json::Value::Null)?;
    tracing::debug!(provider = %config.run_registration_provider, "run registration provider");

    Ok(Driver::new(Arc::new(MemoryStore::new()))
        .with_run_registration(run_registration)
        .with_config(config))
}
