// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifeline - always-on emergency trigger relay.
//!
//! One binary for both execution contexts: the main application commands
//! (`login`, `lifecycle`, `trigger`, `notices`) and the always-on
//! `worker`, plus `serve` for the ingestion endpoint stub.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod lifecycle;
mod login;
mod notices;
mod serve;
mod shutdown;
mod status;
mod trigger;
mod worker;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use lifeline_config::LifelineConfig;
use lifeline_core::{LifecycleState, LifelineError, TriggerKind};
use lifeline_storage::Database;

/// Lifeline - always-on emergency trigger relay.
#[derive(Parser, Debug)]
#[command(name = "lifeline", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ingestion endpoint stub.
    Serve,
    /// Run the always-on background delivery worker.
    Worker {
        /// Drive currently due deliveries once and exit.
        #[arg(long)]
        once: bool,
    },
    /// Mirror an access token and backend base URL into the shared store.
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        base_url: String,
    },
    /// Clear the stored credential.
    Logout,
    /// Report a lifecycle transition of the main application process.
    Lifecycle {
        /// foreground, background or terminated.
        state: LifecycleState,
    },
    /// Raise an emergency trigger from the main application process.
    Trigger {
        /// manual, motion, voice or gesture.
        #[arg(long, default_value = "manual")]
        kind: TriggerKind,
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,
        /// Detail such as "double_shake" or "fall".
        #[arg(long)]
        event_type: Option<String>,
    },
    /// List undismissed notices and recent local alerts.
    Notices {
        /// Dismiss the notice with this id.
        #[arg(long)]
        dismiss: Option<i64>,
    },
    /// Show credential, lifecycle and delivery state.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => lifeline_config::load_and_validate_path(path),
        None => lifeline_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            lifeline_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.app.log_level);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(&config).await,
        Commands::Worker { once } => worker::run_worker(&config, once).await,
        Commands::Login { token, base_url } => login::run_login(&config, token, &base_url).await,
        Commands::Logout => login::run_logout(&config).await,
        Commands::Lifecycle { state } => lifecycle::run_lifecycle(&config, state).await,
        Commands::Trigger {
            kind,
            lat,
            lng,
            event_type,
        } => {
            let args = trigger::TriggerArgs {
                kind,
                location: lat.zip(lng),
                event_type,
            };
            trigger::run_trigger(&config, args).await
        }
        Commands::Notices { dismiss } => notices::run_notices(&config, dismiss).await,
        Commands::Status { json } => status::run_status(&config, json).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Open the device store shared by both execution contexts.
pub(crate) async fn open_store(config: &LifelineConfig) -> Result<Database, LifelineError> {
    Database::open_with_timeout(
        &config.storage.database_path,
        Duration::from_millis(config.storage.busy_timeout_ms),
    )
    .await
}

/// Initializes the tracing subscriber with the given log level. Logs go to
/// stderr so command output on stdout stays clean.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lifeline={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
