// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wacast - WhatsApp bulk template dispatch and delivery reconciliation.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod engine;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use wacast_config::WacastConfig;

/// Wacast - WhatsApp bulk template dispatch engine.
#[derive(Parser, Debug)]
#[command(name = "wacast", version, about, long_about = None)]
struct Cli {
    /// Configuration file; the XDG hierarchy is searched when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatch runner, reconciliation loop and HTTP gateway.
    Serve,
    /// Dry-run the precheck over a campaign's pending recipients.
    Precheck {
        campaign: String,
        /// Template to check against instead of the campaign's own.
        #[arg(long)]
        template: Option<String>,
    },
    /// Re-apply unmatched and errored status events once.
    Reconcile {
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
    /// Reset a sender's target rate to the configured start rate.
    ResetThrottle { sender: String },
    /// Reopen skipped recipients and enqueue them for sending.
    ResendSkipped {
        campaign: String,
        /// Only these recipient ids (repeatable); all skipped when omitted.
        #[arg(long = "recipient")]
        recipients: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => wacast_config::load_and_validate_path(path),
        None => wacast_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            wacast_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.service.log_level);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: WacastConfig) -> Result<(), wacast_core::WacastError> {
    match command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Precheck { campaign, template } => {
            commands::precheck(&config, &campaign, template.as_deref()).await
        }
        Commands::Reconcile { limit } => commands::reconcile(&config, limit).await,
        Commands::ResetThrottle { sender } => commands::reset_throttle(&config, &sender).await,
        Commands::ResendSkipped {
            campaign,
            recipients,
        } => commands::resend_skipped(&config, &campaign, &recipients).await,
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wacast={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
