//! query-cache CLI entry point
//!
//! Dispatches to subcommands.

use clap::Parser;
use console::style;
use query_cache::cli::{Cli, Commands};
use query_cache::config::ConfigManager;
use query_cache::error::QueryCacheResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> QueryCacheResult<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_directives(cli.verbose)))
        .with_target(false)
        .without_time()
        .init();

    let config_manager = ConfigManager::locate(cli.config);

    let config = config_manager.load().await?;

    match cli.command {
        Commands::Serve(args) => query_cache::cli::commands::serve(args, &config).await,
        Commands::Config(args) => {
            query_cache::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// 0 = warn plus the bind announcement, 1 = info, 2+ = debug
fn log_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "query_cache=warn,query_cache::coordinator=info",
        1 => "query_cache=info",
        _ => "query_cache=debug",
    }
}
