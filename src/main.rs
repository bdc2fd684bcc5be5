// SerialHub - User-Mode Serial/TCP Data-Relay Hub
use anyhow::Context;
use clap::Parser;
use serialhub::cli::args::Args;
use serialhub::cli::commands::{execute_command, load_config};
use serialhub::infrastructure::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("failed to load configuration")?;

    let level = if args.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    init_logging(level).ok();

    match execute_command(args, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
