//! # acegraph CLI Module
//!
//! ## Available Commands
//!
//! - `analyze` - Load datasets, run every analysis stage, write the graph
//! - `inspect` - Show dataset headers and whether they would be accepted
//! - `edges` - List the edge types the analysis can produce
//! - `config` - Print the effective configuration

mod commands;

use crate::config::Config;
use acegraph_core::GraphError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// acegraph - attack graphs from collected directory data
///
/// Merges datasets from several collectors into one object graph and derives
/// edges that say which principal can take over which object.
#[derive(Parser, Debug)]
#[command(name = "acegraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./acegraph.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Suppress summary output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the analysis over one or more datasets
    Analyze {
        /// Dataset files, one per collector run
        #[arg(required = true)]
        datasets: Vec<PathBuf>,

        /// Graph output file (overrides [output] path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Worker threads, 0 for one per core (overrides [analysis] workers)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Depth cap for nested group resolution
        #[arg(long)]
        max_depth: Option<usize>,

        /// Write compact JSON
        #[arg(long)]
        compact: bool,

        /// Only export these edge types (repeatable)
        #[arg(short, long = "edge")]
        edges: Vec<String>,

        /// Export hidden edge types too
        #[arg(long)]
        include_hidden: bool,

        /// Attribute to render on each node (repeatable)
        #[arg(short, long = "attribute")]
        attributes: Vec<String>,
    },

    /// Show dataset headers
    Inspect {
        /// Dataset files
        #[arg(required = true)]
        datasets: Vec<PathBuf>,
    },

    /// List edge types
    Edges,

    /// Print the effective configuration
    Config,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli, mut config: Config) -> Result<(), GraphError> {
    let json_mode = cli.json_mode;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Analyze {
            datasets,
            output,
            workers,
            max_depth,
            compact,
            edges,
            include_hidden,
            attributes,
        } => {
            if let Some(output) = output {
                config.output.path = output;
            }
            if let Some(workers) = workers {
                config.analysis.workers = workers;
            }
            if let Some(depth) = max_depth {
                config.analysis.max_traversal_depth = depth;
            }
            if compact {
                config.output.pretty = false;
            }
            let export = ExportRequest {
                edges,
                include_hidden,
                attributes,
            };
            cmd_analyze(&config, &datasets, &export, json_mode, quiet)
        }
        Commands::Inspect { datasets } => cmd_inspect(&config, &datasets, json_mode),
        Commands::Edges => cmd_edges(json_mode),
        Commands::Config => cmd_config(&config),
    }
}
