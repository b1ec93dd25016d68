//! Fail-fast input validation.
//!
//! Every check here runs before any distance is computed, in a fixed order:
//!
//! 1. [`validate_batch`]: non-empty batch, registered keys of the right
//!    kind, identical key sets and vector lengths across the batch.
//! 2. [`validate_metric`]: every metric key registered and present, every
//!    `(kind, distance)` pair legal, every weight finite and non-negative.
//!    Never depends on the number of samples.
//! 3. [`validate_parameters`]: sample count and `k` / `nclusters` ranges.

use qpx_core::{FeatureBundle, InvariantGroup, InvariantRegistry, QpxError, QpxResult};
use std::collections::BTreeMap;
use tracing::debug;

use crate::distance::{DistanceKind, DistanceRegistry};
use crate::metric::TopologyMetricSpec;

/// Smallest batch that yields a non-degenerate kNN graph.
pub const MIN_SAMPLES: usize = 3;

/// Run all three validation stages.
///
/// # Errors
///
/// The first failure found, see the module docs for the order.
pub fn validate_all(
    features: &[FeatureBundle],
    metric: &TopologyMetricSpec,
    schema: &InvariantRegistry,
    distances: &DistanceRegistry,
    k: usize,
    nclusters: usize,
) -> QpxResult<()> {
    validate_batch(features, schema)?;
    validate_metric(metric, features, schema, distances)?;
    validate_parameters(features.len(), k, nclusters)?;
    debug!(samples = features.len(), k, nclusters, "input validated");
    Ok(())
}

// ---------------------------------------------------------------------------
// Batch consistency
// ---------------------------------------------------------------------------

/// Check that the batch is non-empty and structurally consistent.
///
/// # Errors
///
/// [`QpxError::EmptyInput`] for an empty batch,
/// [`QpxError::SchemaInconsistency`] naming the first offending sample
/// otherwise.
pub fn validate_batch(features: &[FeatureBundle], schema: &InvariantRegistry) -> QpxResult<()> {
    let first = features.first().ok_or(QpxError::EmptyInput)?;
    check_against_schema(0, "static", first.static_group(), schema)?;

    let mut dynamic_reference: Option<(usize, &InvariantGroup)> = None;
    for (i, bundle) in features.iter().enumerate() {
        check_same_shape(i, "static", first.static_group(), bundle.static_group())?;

        let Some(dynamic) = bundle.dynamic_group() else {
            continue;
        };
        match dynamic_reference {
            None => {
                check_against_schema(i, "dynamic", dynamic, schema)?;
                dynamic_reference = Some((i, dynamic));
            }
            Some((_, reference)) => check_same_shape(i, "dynamic", reference, dynamic)?,
        }
    }
    Ok(())
}

fn check_against_schema(
    sample: usize,
    group: &str,
    values: &InvariantGroup,
    schema: &InvariantRegistry,
) -> QpxResult<()> {
    for (key, value) in values {
        let registered = schema
            .kind_of(key)
            .ok_or_else(|| QpxError::schema(sample, format!("{group} invariant `{key}` is not registered")))?;
        if registered != value.kind() {
            return Err(QpxError::schema(
                sample,
                format!("{group} invariant `{key}` is registered as {registered} but holds a {}", value.kind()),
            ));
        }
        if !value.is_finite() {
            return Err(QpxError::schema(sample, format!("{group} invariant `{key}` contains non-finite values")));
        }
    }
    Ok(())
}

fn check_same_shape(
    sample: usize,
    group: &str,
    reference: &InvariantGroup,
    values: &InvariantGroup,
) -> QpxResult<()> {
    if let Some(missing) = reference.keys().find(|key| !values.contains_key(*key)) {
        return Err(QpxError::schema(sample, format!("missing {group} invariant `{missing}`")));
    }
    if let Some(extra) = values.keys().find(|key| !reference.contains_key(*key)) {
        return Err(QpxError::schema(sample, format!("unexpected {group} invariant `{extra}`")));
    }
    for (key, expected) in reference {
        let value = &values[key];
        if value.kind() != expected.kind() {
            return Err(QpxError::schema(
                sample,
                format!("{group} invariant `{key}` is a {} but the batch holds {}", value.kind(), expected.kind()),
            ));
        }
        if value.len() != expected.len() {
            return Err(QpxError::schema(
                sample,
                format!("{group} invariant `{key}` has length {}, expected {}", value.len(), expected.len()),
            ));
        }
        if !value.is_finite() {
            return Err(QpxError::schema(sample, format!("{group} invariant `{key}` contains non-finite values")));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Metric compatibility
// ---------------------------------------------------------------------------

/// Check the metric against the schema, the distance table and the batch.
///
/// Assumes [`validate_batch`] passed, so the first bundle (and the first
/// bundle with a dynamic group) stands for the whole batch.
///
/// # Errors
///
/// [`QpxError::MetricIncompatibility`] naming the offending invariant.
pub fn validate_metric(
    metric: &TopologyMetricSpec,
    features: &[FeatureBundle],
    schema: &InvariantRegistry,
    distances: &DistanceRegistry,
) -> QpxResult<()> {
    let static_reference = features.first().map(FeatureBundle::static_group);
    let dynamic_reference = features.iter().find_map(FeatureBundle::dynamic_group);

    check_declared(&metric.static_distances, "static", static_reference, schema, distances)?;
    check_declared(&metric.dynamic_distances, "dynamic", dynamic_reference, schema, distances)?;

    for (key, weight) in &metric.weights {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(QpxError::metric(key, format!("weight {weight} must be finite and >= 0")));
        }
    }
    Ok(())
}

fn check_declared(
    declared: &BTreeMap<String, DistanceKind>,
    group: &str,
    reference: Option<&InvariantGroup>,
    schema: &InvariantRegistry,
    distances: &DistanceRegistry,
) -> QpxResult<()> {
    for (key, distance) in declared {
        let kind = schema
            .kind_of(key)
            .ok_or_else(|| QpxError::metric(key, "invariant is not registered"))?;
        if !distances.supports(kind, distance) {
            return Err(QpxError::metric(
                key,
                format!("distance `{distance}` cannot be applied to a {kind} invariant"),
            ));
        }
        if let Some(values) = reference {
            if !values.contains_key(key) {
                return Err(QpxError::metric(key, format!("invariant is absent from the {group} group")));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parameter ranges
// ---------------------------------------------------------------------------

/// Check `n >= 3`, `1 <= k <= n - 2` and `1 <= nclusters <= n`.
///
/// # Errors
///
/// [`DimensionError::OutOfRange`](qpx_core::DimensionError::OutOfRange)
/// for the first parameter outside its range.
pub fn validate_parameters(n: usize, k: usize, nclusters: usize) -> QpxResult<()> {
    if n < MIN_SAMPLES {
        return Err(QpxError::out_of_range("samples", n, MIN_SAMPLES, usize::MAX));
    }
    if k < 1 || k > n - 2 {
        return Err(QpxError::out_of_range("k", k, 1, n - 2));
    }
    if nclusters < 1 || nclusters > n {
        return Err(QpxError::out_of_range("nclusters", nclusters, 1, n));
    }
    Ok(())
}
