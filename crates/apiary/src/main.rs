// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Apiary, a multi-tenant chat-bot runtime.
//!
//! Binary entry point: `serve` runs the gateway with an in-process
//! broadcast worker; `worker` runs a standalone worker against the
//! same database.

mod serve;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "apiary", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP gateway and the broadcast worker.
    Serve,
    /// Run only the broadcast worker.
    Worker,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match apiary_config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_new(&config.runtime.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Worker => serve::run_worker(config).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "fatal");
        std::process::exit(1);
    }
}
