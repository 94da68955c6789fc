//! # Lodestore
//!
//! The command-line tool for Lodestore entity stores.
//!
//! ## Usage
//!
//! ```bash
//! # Create an empty store
//! lodestore -D app.redb init
//!
//! # Inspect it
//! lodestore -D app.redb status
//! lodestore -D app.redb types
//! lodestore -D app.redb check
//!
//! # Suggest member mappings between two dictionary versions
//! lodestore suggest --from v1.dict --to v2.dict
//! ```

use clap::Parser;
use lodestore::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Initialize tracing: LODESTORE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("LODESTORE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lodestore=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
