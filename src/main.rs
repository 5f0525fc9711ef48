//! Reload Backend
//!
//! Starts the game backend service: sweeps expired tokens, mounts the
//! capability modules, serves them on the primary listener (plain or TLS)
//! and optionally on the companion website, then keeps maintenance tasks
//! running until shutdown.
//!
//! # Architecture Overview
//!
//! ```text
//!   config ─▶ lifecycle::startup
//!                │
//!                ├─▶ tokens (load, prune, persist)
//!                ├─▶ capabilities (ordered registry → router)
//!                ├─▶ net (transport, bind, conflict handling)
//!                │     └─▶ http (upgrade layer, tracing, rate limit, boundary)
//!                ├─▶ maintenance (update check, restart, rotation)
//!                └─▶ website listener
//! ```

use std::path::PathBuf;

use clap::Parser;

use reload_backend::config::load_config;
use reload_backend::lifecycle::{Collaborators, Orchestrator, Outcome};
use reload_backend::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "reload-backend")]
#[command(version, about = "Reload game backend", long_about = None)]
struct Cli {
    /// Configuration file (.json or .toml)
    #[arg(short, long, default_value = "Config/config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init("reload_backend=info");
            tracing::error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    logging::init(&config.log_level);
    tracing::info!(path = %cli.config.display(), port = config.port, "Configuration loaded");

    if let Some(addr) = &config.metrics_address {
        match addr.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(metrics_address = %addr, "Failed to parse metrics address"),
        }
    }

    let outcome = Orchestrator::new(config, Collaborators::builtin()).run().await?;

    if let Outcome::Exit(code) = outcome {
        std::process::exit(code);
    }
    Ok(())
}
