//! Classification entry point and result types.
//!
//! ```text
//! features ─▶ validate ─▶ DistanceMatrix ─▶ AffinityGraph ─▶ SpectralClustering
//!                                  │                                │ labels
//!                                  └──────▶ NeighborhoodEntropy ◀───┘
//!                                                   │
//!                                           ClassificationResult
//! ```
//!
//! Every validation error is raised before the first distance is computed.

use qpx_core::error::{read_json, write_json, ConfigError};
use qpx_core::{FeatureBundle, InvariantRegistry, QpxResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, info_span, warn};

use crate::config::ClassifierConfig;
use crate::distance::DistanceRegistry;
use crate::entropy::NeighborhoodEntropy;
use crate::graph::KnnGraphBuilder;
use crate::matrix::DistanceMatrix;
use crate::metric::{TopologyDistance, TopologyMetricSpec};
use crate::spectral::SpectralClustering;
use crate::validation::{validate_all, validate_parameters};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome of one classification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Cluster label per sample, in `[0, nclusters)`.
    pub labels: Vec<usize>,
    /// Per-sample confidence in `(0, 1]`.
    pub confidence: Vec<f64>,
    /// Smallest normalized-Laplacian eigenvalues, ascending. At least
    /// `nclusters` of them.
    pub eigenvalues: Vec<f64>,
    /// Diagnostics and the settings used.
    pub report: ClassificationReport,
}

/// Structured metadata of a [`ClassificationResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// `λ[nclusters] − λ[nclusters − 1]`, or 0 when not available.
    pub eigengap: f64,
    /// Neighbourhood entropy scores.
    pub uncertainty: UncertaintyReport,
    /// Settings the call ran with.
    pub settings: ClassificationSettings,
    /// Numerical diagnostics.
    pub diagnostics: SpectralDiagnostics,
}

/// Per-sample neighbourhood uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyReport {
    /// Neighbourhood label entropy (nats).
    pub entropy: Vec<f64>,
    /// `entropy > threshold`.
    pub ambiguous: Vec<bool>,
    /// `0.5 · ln(nclusters)`.
    pub threshold: f64,
}

/// Settings recorded with a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSettings {
    /// Metric the distances were computed with. Empty for a precomputed
    /// distance matrix.
    pub metric: TopologyMetricSpec,
    /// Number of clusters.
    pub nclusters: usize,
    /// Neighbours per sample.
    pub k: usize,
    /// Gaussian bandwidth, if any.
    pub sigma: Option<f64>,
    /// Seed, if the run was seeded.
    pub seed: Option<u64>,
}

/// Numerical diagnostics of the spectral stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralDiagnostics {
    /// Eigensolver block iterations.
    pub solver_iterations: usize,
    /// Whether the eigensolver met its tolerance.
    pub converged: bool,
    /// Largest eigenpair residual.
    pub max_residual: f64,
    /// Weakly connected components of the affinity graph.
    pub graph_components: usize,
    /// Inertia of the chosen k-means run.
    pub kmeans_inertia: f64,
}

impl ClassificationResult {
    /// Number of classified samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` when nothing was classified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of samples flagged ambiguous.
    #[must_use]
    pub fn ambiguous_count(&self) -> usize {
        self.report.uncertainty.ambiguous.iter().filter(|&&a| a).count()
    }

    /// Samples per cluster label.
    #[must_use]
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.report.settings.nclusters];
        for &label in &self.labels {
            if let Some(slot) = sizes.get_mut(label) {
                *slot += 1;
            }
        }
        sizes
    }

    /// Write the result as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FileRead`] when the file cannot be written.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        write_json(self, path)
    }

    /// Read a result written by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        read_json(path)
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Configured classifier.
///
/// ```rust
/// use qpx_classify::prelude::*;
///
/// let features: Vec<FeatureBundle> = (0..12)
///     .map(|i| {
///         let x = if i < 6 { 0.0 } else { 50.0 } + (i % 6) as f64 * 0.1;
///         FeatureBundle::new(format!("s{i}")).with_static("persistence_entropy", x)
///     })
///     .collect();
/// let metric = TopologyMetricSpec::new().with_static("persistence_entropy", DistanceKind::ABSOLUTE);
///
/// let classifier = Classifier::new(ClassifierConfig::with_counts(3, 2));
/// let result = classifier.classify(&features, &metric).unwrap();
///
/// assert_eq!(result.len(), 12);
/// assert_ne!(result.labels[0], result.labels[11]);
/// ```
#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
    schema: InvariantRegistry,
    distances: DistanceRegistry,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl Classifier {
    /// Classifier with the standard invariant schema and distance table.
    ///
    /// The configuration is validated on every call, after the inputs.
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config, schema: InvariantRegistry::standard(), distances: DistanceRegistry::standard() }
    }

    /// Replace the invariant schema.
    #[must_use]
    pub fn with_schema(mut self, schema: InvariantRegistry) -> Self {
        self.schema = schema;
        self
    }

    /// Replace the distance table.
    #[must_use]
    pub fn with_distances(mut self, distances: DistanceRegistry) -> Self {
        self.distances = distances;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Invariant schema in use.
    #[must_use]
    pub fn schema(&self) -> &InvariantRegistry {
        &self.schema
    }

    /// Distance table in use.
    #[must_use]
    pub fn distances(&self) -> &DistanceRegistry {
        &self.distances
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Classify `features` under `metric`, drawing randomness from the
    /// configured seed (or OS entropy when unseeded).
    ///
    /// # Errors
    ///
    /// Validation errors ([`QpxError::EmptyInput`],
    /// [`QpxError::SchemaInconsistency`], [`QpxError::MetricIncompatibility`],
    /// [`DimensionError::OutOfRange`], [`QpxError::Config`]) before any
    /// numeric work, then numerical errors.
    ///
    /// [`QpxError::EmptyInput`]: qpx_core::QpxError::EmptyInput
    /// [`QpxError::SchemaInconsistency`]: qpx_core::QpxError::SchemaInconsistency
    /// [`QpxError::MetricIncompatibility`]: qpx_core::QpxError::MetricIncompatibility
    /// [`QpxError::Config`]: qpx_core::QpxError::Config
    /// [`DimensionError::OutOfRange`]: qpx_core::DimensionError::OutOfRange
    pub fn classify(&self, features: &[FeatureBundle], metric: &TopologyMetricSpec) -> QpxResult<ClassificationResult> {
        self.classify_with_rng(features, metric, &mut self.rng())
    }

    /// [`classify`](Self::classify) with an explicit source of randomness.
    ///
    /// # Errors
    ///
    /// As [`classify`](Self::classify).
    pub fn classify_with_rng<R: Rng>(
        &self,
        features: &[FeatureBundle],
        metric: &TopologyMetricSpec,
        rng: &mut R,
    ) -> QpxResult<ClassificationResult> {
        let span = info_span!("classify", samples = features.len(), k = self.config.k, nclusters = self.config.nclusters);
        let _enter = span.enter();

        validate_all(features, metric, &self.schema, &self.distances, self.config.k, self.config.nclusters)?;
        self.config.validate()?;

        let matrix = DistanceMatrix::compute(features, &TopologyDistance::new(metric, &self.distances))?;
        self.cluster(&matrix, metric.clone(), rng)
    }

    /// Classify from a precomputed distance matrix.
    ///
    /// # Errors
    ///
    /// [`DimensionError::OutOfRange`](qpx_core::DimensionError::OutOfRange)
    /// and [`QpxError::Config`](qpx_core::QpxError::Config) before numeric
    /// work, then numerical errors.
    pub fn classify_precomputed<R: Rng>(&self, matrix: &DistanceMatrix, rng: &mut R) -> QpxResult<ClassificationResult> {
        let span = info_span!("classify_precomputed", samples = matrix.len());
        let _enter = span.enter();

        if matrix.is_empty() {
            return Err(qpx_core::QpxError::EmptyInput);
        }
        validate_parameters(matrix.len(), self.config.k, self.config.nclusters)?;
        self.config.validate()?;
        self.cluster(matrix, TopologyMetricSpec::default(), rng)
    }

    fn cluster<R: Rng>(
        &self,
        matrix: &DistanceMatrix,
        metric: TopologyMetricSpec,
        rng: &mut R,
    ) -> QpxResult<ClassificationResult> {
        let cfg = &self.config;

        let graph = KnnGraphBuilder::new(cfg.k).with_sigma(cfg.sigma).build(matrix)?;
        let components = graph.connected_components();
        if components > cfg.nclusters {
            warn!(components, nclusters = cfg.nclusters, "affinity graph has more components than clusters");
        }

        let spectral = SpectralClustering::from_config(cfg).fit(&graph, rng)?;
        let scores = NeighborhoodEntropy::new(cfg.k, cfg.nclusters).compute(matrix, &spectral.labels)?;

        let result = ClassificationResult {
            labels: spectral.labels,
            confidence: scores.confidence,
            eigenvalues: spectral.eigenvalues,
            report: ClassificationReport {
                eigengap: spectral.eigengap,
                uncertainty: UncertaintyReport {
                    entropy: scores.entropy,
                    ambiguous: scores.ambiguous,
                    threshold: scores.threshold,
                },
                settings: ClassificationSettings {
                    metric,
                    nclusters: cfg.nclusters,
                    k: cfg.k,
                    sigma: cfg.sigma,
                    seed: cfg.seed,
                },
                diagnostics: SpectralDiagnostics {
                    solver_iterations: spectral.solver.iterations,
                    converged: spectral.solver.converged,
                    max_residual: spectral.solver.max_residual,
                    graph_components: components,
                    kmeans_inertia: spectral.inertia,
                },
            },
        };
        info!(
            samples = result.len(),
            ambiguous = result.ambiguous_count(),
            eigengap = result.report.eigengap,
            "classification complete"
        );
        Ok(result)
    }
}

/// Classify with the default configuration, schema and distance table.
///
/// # Errors
///
/// As [`Classifier::classify`].
pub fn classify(
    features: &[FeatureBundle],
    metric: &TopologyMetricSpec,
    k: usize,
    nclusters: usize,
) -> QpxResult<ClassificationResult> {
    Classifier::new(ClassifierConfig::with_counts(k, nclusters)).classify(features, metric)
}
