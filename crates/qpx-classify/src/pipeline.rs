//! Glue between the external collaborators and the classifier.
//!
//! Observed data: `IntensityData ─extract─▶ FeatureBundle ─▶ classify`.
//! Model hypotheses: `ModelHypothesis ─simulate─▶ IntensityData ─extract─▶ …`.
//!
//! Samples are processed in parallel; the first failure in sample order is
//! returned. Failures of a collaborator surface as
//! [`QpxError::Extraction`] / [`QpxError::Simulation`].

use qpx_core::{
    FeatureBundle, FeatureExtractor, FeatureSpec, IntensityData, ModelHypothesis, QpxError, QpxResult,
    QuerySpec, Simulator,
};
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::classifier::{ClassificationResult, Classifier};
use crate::metric::TopologyMetricSpec;

fn as_extraction_error(sample: usize, err: QpxError) -> QpxError {
    match err {
        QpxError::Extraction { .. } => err,
        other => QpxError::extraction(format!("sample {sample}: {other}")),
    }
}

fn as_simulation_error(hypothesis: &ModelHypothesis, err: QpxError) -> QpxError {
    match err {
        QpxError::Simulation { .. } => err,
        other => QpxError::simulation(format!("hypothesis `{}`: {other}", hypothesis.name)),
    }
}

/// Run `extractor` over every cube.
///
/// # Errors
///
/// [`QpxError::Extraction`] for the first failing cube.
#[instrument(skip_all, fields(extractor = extractor.name(), samples = data.len()))]
pub fn extract_batch<E>(extractor: &E, data: &[IntensityData], spec: &FeatureSpec) -> QpxResult<Vec<FeatureBundle>>
where
    E: FeatureExtractor + ?Sized,
{
    let bundles: QpxResult<Vec<FeatureBundle>> = data
        .par_iter()
        .enumerate()
        .map(|(i, cube)| extractor.extract(cube, spec).map_err(|e| as_extraction_error(i, e)))
        .collect();
    debug!("batch extracted");
    bundles
}

/// Simulate every hypothesis on `query` and extract its features.
///
/// # Errors
///
/// [`QpxError::Simulation`] or [`QpxError::Extraction`] for the first
/// failing hypothesis.
#[instrument(skip_all, fields(simulator = simulator.name(), hypotheses = hypotheses.len()))]
pub fn simulate_batch<S, E>(
    simulator: &S,
    extractor: &E,
    hypotheses: &[ModelHypothesis],
    query: &QuerySpec,
    spec: &FeatureSpec,
) -> QpxResult<Vec<FeatureBundle>>
where
    S: Simulator + ?Sized,
    E: FeatureExtractor + ?Sized,
{
    hypotheses
        .par_iter()
        .enumerate()
        .map(|(i, hypothesis)| {
            let cube = simulator.simulate(hypothesis, query).map_err(|e| as_simulation_error(hypothesis, e))?;
            extractor.extract(&cube, spec).map_err(|e| as_extraction_error(i, e))
        })
        .collect()
}

/// Extract features from observed cubes and classify them.
///
/// # Errors
///
/// Extraction errors, then everything [`Classifier::classify`] reports.
pub fn classify_observed<E>(
    classifier: &Classifier,
    extractor: &E,
    data: &[IntensityData],
    spec: &FeatureSpec,
    metric: &TopologyMetricSpec,
) -> QpxResult<ClassificationResult>
where
    E: FeatureExtractor + ?Sized,
{
    let features = extract_batch(extractor, data, spec)?;
    classifier.classify(&features, metric)
}

/// Simulate, extract and classify a set of model hypotheses.
///
/// # Errors
///
/// Simulation and extraction errors, then everything
/// [`Classifier::classify`] reports.
pub fn classify_hypotheses<S, E>(
    classifier: &Classifier,
    simulator: &S,
    extractor: &E,
    hypotheses: &[ModelHypothesis],
    query: &QuerySpec,
    spec: &FeatureSpec,
    metric: &TopologyMetricSpec,
) -> QpxResult<ClassificationResult>
where
    S: Simulator + ?Sized,
    E: FeatureExtractor + ?Sized,
{
    let features = simulate_batch(simulator, extractor, hypotheses, query, spec)?;
    classifier.classify(&features, metric)
}
