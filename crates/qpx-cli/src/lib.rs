//! QPX CLI
//!
//! Command-line interface for classifying quasi-particle excitations from
//! their topological feature bundles.
//!
//! # Features
//!
//! - **classify**: Cluster a JSON batch of feature bundles under a metric
//! - **registry**: Show the invariant schema and the supported distances
//! - **version**: Display version information
//!
//! # Usage
//!
//! ```bash
//! # Classify a batch with 4 clusters and 8 neighbours
//! qpx classify features.json --metric metric.json -n 4 -k 8
//!
//! # Reproduce a run from a saved configuration and write the result
//! qpx classify features.json -m metric.json -c run.json -o result.json
//!
//! # Inspect the invariant schema
//! qpx registry --format json
//! ```

use clap::{Parser, Subcommand, ValueEnum};

pub mod classify;
pub mod registry;

/// QPX Command Line Interface
#[derive(Parser, Debug)]
#[command(name = "qpx")]
#[command(author, version, about = "Unsupervised classification of quasi-particle excitations")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a batch of feature bundles
    Classify(classify::ClassifyArgs),

    /// Show the invariant schema and distance table
    Registry(registry::RegistryArgs),

    /// Display version information
    Version,
}

/// Output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty table output
    #[default]
    Table,
    /// JSON output
    Json,
}
