//! # acegraph
//!
//! Builds an attack graph from collected directory datasets.
//!
//! ## Usage
//!
//! ```bash
//! # Analyse two collector runs and write graph.json
//! acegraph analyze ldap.aceg host.aceg -o graph.json
//!
//! # Check dataset headers against the known collectors
//! acegraph inspect ldap.aceg
//!
//! # List the edge types the analysis produces
//! acegraph edges --json-mode
//! ```
//!
//! Logs go to stderr. `ACEGRAPH_LOG_FORMAT=json` selects JSON lines and
//! `RUST_LOG` overrides the configured filter.

use acegraph::cli::{self, Cli};
use acegraph::config::{Config, DEFAULT_LOG_FILTER, LogFormat, LoggingConfig};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging);

    if let Err(e) = cli::execute(cli, config) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. The environment wins over the file.
fn init_tracing(logging: &LoggingConfig) {
    let format = match std::env::var("ACEGRAPH_LOG_FORMAT") {
        Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
        Ok(_) => LogFormat::Text,
        Err(_) => logging.format,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER).into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
