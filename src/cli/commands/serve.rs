//! Serve command - run the caching proxy in the foreground

use crate::cli::args::ServeArgs;
use crate::config::Config;
use crate::coordinator::PortCoordinator;
use crate::error::{QueryCacheError, QueryCacheResult};
use crate::plugin::{QueryCacheOptions, PORT_DEFINE_KEY};
use console::style;
use std::net::SocketAddr;
use tracing::info;

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: &Config) -> QueryCacheResult<()> {
    let mut options = QueryCacheOptions::from_config(config);
    if let Some(port) = args.port {
        options = options.port(port);
    }
    if let Some(host) = args.host {
        options = options.host(host);
    }

    let coordinator = PortCoordinator::new(&options);
    let port = coordinator.ensure_started().await?;

    println!(
        "{} Listening on {}",
        style("✓").green(),
        style(format!("http://{}", SocketAddr::new(options.host, port))).cyan()
    );
    println!("  {}={}", style(PORT_DEFINE_KEY).dim(), port);
    println!("  {}", style("Press Ctrl-C to stop").dim());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| QueryCacheError::io("waiting for Ctrl-C", e))?;

    info!("Shutting down cache server on port {}", port);
    Ok(())
}
