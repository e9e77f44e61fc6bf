use clap::Parser;
use eyre::{Context, Result};
use tracing_subscriber::EnvFilter;

use taskvault::cli::commands::Cli;
use taskvault::cli::handlers;

/// Log to stderr so stdout stays clean for listings and JSON
fn setup_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .wrap_err_with(|| format!("invalid --log-level '{}'", level))?,
        // Notices and the final error line already reach the user; the log
        // stays silent unless asked for
        None => EnvFilter::try_from_env("TASKVAULT_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("off")),
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match setup_logging(cli.log_level.as_deref()) {
        Ok(()) => handlers::dispatch(cli).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
