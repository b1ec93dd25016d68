//! Contracts of the external collaborators.
//!
//! The classifier never computes topological invariants or simulates
//! spectra itself. It consumes them through two traits:
//!
//! - [`FeatureExtractor`]: raw intensity data + [`FeatureSpec`] → [`FeatureBundle`]
//! - [`Simulator`]: [`ModelHypothesis`] + [`QuerySpec`] → [`IntensityData`]
//!
//! Implementations report failures as [`QpxError::Extraction`] and
//! [`QpxError::Simulation`] respectively.
//!
//! [`QpxError::Extraction`]: crate::error::QpxError::Extraction
//! [`QpxError::Simulation`]: crate::error::QpxError::Simulation

use crate::error::QpxResult;
use crate::types::{FeatureBundle, FeatureSpec, IntensityData, ModelHypothesis, QuerySpec};

/// Produces a feature bundle from one raw intensity cube.
///
/// # Example
///
/// ```ignore
/// use qpx_core::{FeatureExtractor, FeatureSpec, IntensityData};
///
/// fn extract_all(extractor: &impl FeatureExtractor, cubes: &[IntensityData], spec: &FeatureSpec) {
///     for (i, cube) in cubes.iter().enumerate() {
///         match extractor.extract(cube, spec) {
///             Ok(bundle) => println!("sample {i}: {} invariants", bundle.static_group().len()),
///             Err(e) => eprintln!("sample {i}: {e}"),
///         }
///     }
/// }
/// ```
pub trait FeatureExtractor: Send + Sync {
    /// Extract the invariants named by `spec` from `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be analysed.
    fn extract(&self, data: &IntensityData, spec: &FeatureSpec) -> QpxResult<FeatureBundle>;

    /// Human-readable extractor name used in logs.
    fn name(&self) -> &str {
        "extractor"
    }
}

/// Produces an intensity cube from a model hypothesis.
pub trait Simulator: Send + Sync {
    /// Evaluate `hypothesis` on the grid described by `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the hypothesis cannot be simulated.
    fn simulate(&self, hypothesis: &ModelHypothesis, query: &QuerySpec) -> QpxResult<IntensityData>;

    /// Human-readable simulator name used in logs.
    fn name(&self) -> &str {
        "simulator"
    }
}
