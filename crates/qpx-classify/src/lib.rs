//! QPX Classification Library
//!
//! Unsupervised classification of quasi-particle excitations from their
//! topological feature bundles.
//!
//! # Features
//!
//! - **Distances**: Per-invariant distance functions selected by
//!   (invariant kind, distance kind) through a [`DistanceRegistry`]
//! - **Metric**: Weighted aggregation of per-invariant distances
//!   ([`TopologyMetricSpec`])
//! - **Graph**: Directed k-nearest-neighbour affinity graphs in CSR form
//! - **Spectral Clustering**: Normalized Laplacian, block eigensolver and
//!   seeded k-means on the row-normalized embedding
//! - **Uncertainty**: Neighbourhood label entropy, confidence and ambiguity
//! - **Pipeline**: Glue for the external feature extractor and simulator
//!
//! # Example
//!
//! ```rust
//! use qpx_classify::prelude::*;
//!
//! let features: Vec<FeatureBundle> = (0..10)
//!     .map(|i| {
//!         let offset = if i < 5 { 0.0 } else { 20.0 };
//!         FeatureBundle::new(format!("run-{i}"))
//!             .with_static("persistence_entropy", offset + i as f64 * 0.1)
//!             .with_static("betti_curve", vec![offset, 1.0, 0.5])
//!     })
//!     .collect();
//!
//! let metric = TopologyMetricSpec::new()
//!     .with_static("persistence_entropy", DistanceKind::ABSOLUTE)
//!     .with_static("betti_curve", DistanceKind::EUCLIDEAN)
//!     .with_weight("betti_curve", 0.5);
//!
//! let result = classify(&features, &metric, 3, 2).unwrap();
//! assert_eq!(result.labels.len(), 10);
//! assert!(result.confidence.iter().all(|&c| c > 0.0 && c <= 1.0));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classifier;
pub mod config;
pub mod distance;
pub mod eigen;
pub mod entropy;
pub mod graph;
pub mod kmeans;
pub mod laplacian;
pub mod matrix;
pub mod metric;
pub mod pipeline;
pub mod spectral;
pub mod validation;

// Re-export main types for convenience
pub use classifier::{
    classify, ClassificationReport, ClassificationResult, ClassificationSettings, Classifier,
    SpectralDiagnostics, UncertaintyReport,
};
pub use config::{ClassifierConfig, EigenSolverConfig, KMeansConfig, KMeansInit};
pub use distance::{DistanceFn, DistanceKind, DistanceRegistry};
pub use eigen::{EigenDecomposition, SubspaceEigensolver};
pub use entropy::{NeighborhoodEntropy, NeighborhoodScores};
pub use graph::{AffinityGraph, KnnGraphBuilder};
pub use kmeans::{KMeans, KMeansFit};
pub use laplacian::NormalizedLaplacian;
pub use matrix::DistanceMatrix;
pub use metric::{TopologyDistance, TopologyMetricSpec};
pub use pipeline::{classify_hypotheses, classify_observed, extract_batch, simulate_batch};
pub use spectral::{SpectralAssignment, SpectralClustering};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classifier::{classify, ClassificationResult, Classifier};
    pub use crate::config::ClassifierConfig;
    pub use crate::distance::{DistanceKind, DistanceRegistry};
    pub use crate::metric::TopologyMetricSpec;
    pub use qpx_core::prelude::*;
}
