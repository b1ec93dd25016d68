//! `qpx registry`: print the invariant schema and the distance table.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

use qpx_classify::DistanceRegistry;
use qpx_core::InvariantRegistry;

use crate::OutputFormat;

/// Arguments for the registry command
#[derive(Args, Debug)]
pub struct RegistryArgs {
    /// Invariant schema file (defaults to the standard schema)
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Tabled)]
struct InvariantRow {
    #[tabled(rename = "Invariant")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Distances")]
    distances: String,
}

/// Schema named by `args`, or the standard one.
pub fn load_schema(args: &RegistryArgs) -> Result<InvariantRegistry> {
    match &args.schema {
        Some(path) => InvariantRegistry::from_json(path).with_context(|| format!("loading schema {}", path.display())),
        None => Ok(InvariantRegistry::standard()),
    }
}

/// Execute the registry command
pub fn execute(args: RegistryArgs) -> Result<()> {
    let schema = load_schema(&args)?;
    let distances = DistanceRegistry::standard();

    match args.format {
        OutputFormat::Json => {
            let pairs: Vec<serde_json::Value> = distances
                .pairs()
                .into_iter()
                .map(|(kind, distance)| serde_json::json!({ "kind": kind, "distance": distance }))
                .collect();
            let report = serde_json::json!({ "invariants": schema, "distances": pairs });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            let rows: Vec<InvariantRow> = schema
                .iter()
                .map(|(name, kind)| InvariantRow {
                    name: name.to_string(),
                    kind: kind.to_string(),
                    distances: distances
                        .distances_for(kind)
                        .iter()
                        .map(|d| d.as_str().to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            println!("{}", "Invariant Schema".bold().cyan());
            println!("{}", "=".repeat(60));
            if rows.is_empty() {
                println!("No invariants registered.");
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()).to_string());
            }
        }
    }
    Ok(())
}
