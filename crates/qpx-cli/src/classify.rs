//! `qpx classify`: load a feature batch and a metric, run the classifier
//! and report labels, confidences and spectral diagnostics.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::info;

use qpx_classify::{ClassificationResult, Classifier, ClassifierConfig, TopologyMetricSpec};
use qpx_core::error::read_json;
use qpx_core::{FeatureBundle, InvariantRegistry};

use crate::OutputFormat;

/// Arguments for the classify command
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// JSON file holding an array of feature bundles
    pub features: PathBuf,

    /// JSON file holding the topology metric
    #[arg(short, long)]
    pub metric: PathBuf,

    /// Classifier configuration file (missing fields take defaults)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Invariant schema file (defaults to the standard schema)
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Neighbours per sample
    #[arg(short)]
    pub k: Option<usize>,

    /// Number of clusters
    #[arg(short, long)]
    pub nclusters: Option<usize>,

    /// Gaussian kernel bandwidth (binary weights when omitted)
    #[arg(long)]
    pub sigma: Option<f64>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the full result as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl ClassifyArgs {
    /// Configuration file (or defaults) with the command-line overrides
    /// applied on top.
    pub fn resolve_config(&self) -> Result<ClassifierConfig> {
        let mut config = match &self.config {
            Some(path) => ClassifierConfig::from_json(path)
                .with_context(|| format!("loading classifier config {}", path.display()))?,
            None => ClassifierConfig::default(),
        };
        if let Some(k) = self.k {
            config.k = k;
        }
        if let Some(nclusters) = self.nclusters {
            config.nclusters = nclusters;
        }
        if self.sigma.is_some() {
            config.sigma = self.sigma;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate().context("invalid classifier configuration")?;
        Ok(config)
    }
}

/// Per-sample display row
#[derive(Tabled, Serialize)]
struct SampleRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Sample")]
    id: String,
    #[tabled(rename = "Cluster")]
    label: usize,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Entropy")]
    entropy: String,
    #[tabled(rename = "Ambiguous")]
    ambiguous: String,
}

/// Load inputs, classify, and return the result.
pub fn run(args: &ClassifyArgs) -> Result<(Vec<FeatureBundle>, ClassificationResult)> {
    let config = args.resolve_config()?;
    let features: Vec<FeatureBundle> =
        read_json(&args.features).with_context(|| format!("loading features {}", args.features.display()))?;
    let metric = TopologyMetricSpec::from_json(&args.metric)
        .with_context(|| format!("loading metric {}", args.metric.display()))?;

    let mut classifier = Classifier::new(config);
    if let Some(path) = &args.schema {
        let schema =
            InvariantRegistry::from_json(path).with_context(|| format!("loading schema {}", path.display()))?;
        classifier = classifier.with_schema(schema);
    }

    info!(samples = features.len(), "classifying {}", args.features.display());
    let result = classifier.classify(&features, &metric).context("classification failed")?;

    if let Some(path) = &args.output {
        result.to_json(path).with_context(|| format!("writing result {}", path.display()))?;
        info!("result written to {}", path.display());
    }
    Ok((features, result))
}

/// Execute the classify command
pub fn execute(args: ClassifyArgs) -> Result<()> {
    let (features, result) = run(&args)?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => print_table(&features, &result, args.output.as_deref()),
    }
    Ok(())
}

fn print_table(features: &[FeatureBundle], result: &ClassificationResult, output: Option<&Path>) {
    let uncertainty = &result.report.uncertainty;
    let rows: Vec<SampleRow> = features
        .iter()
        .enumerate()
        .map(|(i, bundle)| SampleRow {
            index: i,
            id: bundle.id().to_string(),
            label: result.labels[i],
            confidence: format!("{:.3}", result.confidence[i]),
            entropy: format!("{:.3}", uncertainty.entropy[i]),
            ambiguous: if uncertainty.ambiguous[i] { "yes".yellow().to_string() } else { String::new() },
        })
        .collect();

    println!("{}", "Classification".bold().cyan());
    println!("{}", "=".repeat(60));
    println!("{}", Table::new(rows).with(Style::rounded()).to_string());
    println!();

    let diagnostics = &result.report.diagnostics;
    println!("{}", "Summary:".bold());
    println!("  {} {}", "Samples:".dimmed(), result.len());
    println!("  {} {:?}", "Cluster sizes:".dimmed(), result.cluster_sizes());
    println!(
        "  {} {} (threshold {:.3})",
        "Ambiguous:".dimmed(),
        result.ambiguous_count(),
        uncertainty.threshold
    );
    println!(
        "  {} {}",
        "Eigenvalues:".dimmed(),
        result.eigenvalues.iter().map(|v| format!("{v:.4}")).collect::<Vec<_>>().join(", ")
    );
    println!("  {} {:.4}", "Eigengap:".dimmed(), result.report.eigengap);
    println!("  {} {}", "Graph components:".dimmed(), diagnostics.graph_components);
    let convergence = if diagnostics.converged {
        "converged".green()
    } else {
        "not converged".red()
    };
    println!(
        "  {} {} after {} iterations (residual {:.2e})",
        "Eigensolver:".dimmed(),
        convergence,
        diagnostics.solver_iterations,
        diagnostics.max_residual
    );
    if let Some(path) = output {
        println!("  {} {}", "Written to:".dimmed(), path.display());
    }
}
