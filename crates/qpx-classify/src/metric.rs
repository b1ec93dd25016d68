//! Metric declaration and bundle-distance aggregation.
//!
//! A [`TopologyMetricSpec`] says which distance applies to each invariant
//! of the static group and, independently, of the dynamic group, plus an
//! optional weight per invariant key. [`TopologyDistance`] turns a spec and
//! a [`DistanceRegistry`] into a distance between two feature bundles:
//!
//! ```text
//! d(A, B) = Σ_static  w[key] · d_key(A[key], B[key])
//!         + Σ_dynamic w[key] · d_key(A[key], B[key])   (only when both have a dynamic group)
//! ```
//!
//! Keys are visited in sorted order, so `d(A, B)` and `d(B, A)` perform the
//! same floating point operations and agree bit for bit.

use qpx_core::error::{read_json, write_json, ConfigError};
use qpx_core::{FeatureBundle, InvariantGroup, QpxResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::distance::{DistanceKind, DistanceRegistry};

/// Weight used for invariants without an explicit entry.
pub const DEFAULT_WEIGHT: f64 = 1.0;

// ---------------------------------------------------------------------------
// TopologyMetricSpec
// ---------------------------------------------------------------------------

/// Per-invariant distance and weight declaration.
///
/// ```rust
/// use qpx_classify::distance::DistanceKind;
/// use qpx_classify::metric::TopologyMetricSpec;
///
/// let metric = TopologyMetricSpec::new()
///     .with_static("persistence_entropy", DistanceKind::ABSOLUTE)
///     .with_static("betti_curve", DistanceKind::EUCLIDEAN)
///     .with_weight("betti_curve", 0.5);
///
/// assert_eq!(metric.weight("betti_curve"), 0.5);
/// assert_eq!(metric.weight("persistence_entropy"), 1.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyMetricSpec {
    /// Distance per static invariant.
    #[serde(rename = "static")]
    pub static_distances: BTreeMap<String, DistanceKind>,

    /// Distance per dynamic invariant.
    #[serde(rename = "dynamic")]
    pub dynamic_distances: BTreeMap<String, DistanceKind>,

    /// Aggregation weight per invariant key, shared by both groups.
    /// Missing keys weigh [`DEFAULT_WEIGHT`].
    pub weights: BTreeMap<String, f64>,
}

impl TopologyMetricSpec {
    /// Empty metric.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the distance of a static invariant.
    #[must_use]
    pub fn with_static(mut self, key: impl Into<String>, distance: DistanceKind) -> Self {
        self.static_distances.insert(key.into(), distance);
        self
    }

    /// Declare the distance of a dynamic invariant.
    #[must_use]
    pub fn with_dynamic(mut self, key: impl Into<String>, distance: DistanceKind) -> Self {
        self.dynamic_distances.insert(key.into(), distance);
        self
    }

    /// Set the aggregation weight of `key`.
    #[must_use]
    pub fn with_weight(mut self, key: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(key.into(), weight);
        self
    }

    /// Aggregation weight of `key`.
    #[must_use]
    pub fn weight(&self, key: &str) -> f64 {
        self.weights.get(key).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    /// Returns `true` when neither group declares a distance.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.static_distances.is_empty() && self.dynamic_distances.is_empty()
    }

    /// Load a metric from JSON.
    ///
    /// ```json
    /// { "static": { "betti_curve": "euclidean" }, "dynamic": {}, "weights": { "betti_curve": 2.0 } }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        read_json(path)
    }

    /// Write the metric as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be written.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        write_json(self, path)
    }
}

// ---------------------------------------------------------------------------
// TopologyDistance
// ---------------------------------------------------------------------------

/// Weighted sum of per-invariant distances between two bundles.
#[derive(Debug, Clone, Copy)]
pub struct TopologyDistance<'a> {
    metric: &'a TopologyMetricSpec,
    distances: &'a DistanceRegistry,
}

impl<'a> TopologyDistance<'a> {
    /// Bind a metric to the distance table it is evaluated with.
    pub fn new(metric: &'a TopologyMetricSpec, distances: &'a DistanceRegistry) -> Self {
        Self { metric, distances }
    }

    /// Metric in use.
    pub fn metric(&self) -> &'a TopologyMetricSpec {
        self.metric
    }

    /// Distance between two bundles.
    ///
    /// Keys missing from either bundle contribute nothing, as does the
    /// dynamic group unless both bundles carry one.
    ///
    /// # Errors
    ///
    /// Propagates per-invariant failures such as
    /// [`DimensionError::LengthMismatch`](qpx_core::DimensionError::LengthMismatch).
    pub fn between(&self, a: &FeatureBundle, b: &FeatureBundle) -> QpxResult<f64> {
        let mut total = self.group_sum(&self.metric.static_distances, a.static_group(), b.static_group())?;
        if let (Some(da), Some(db)) = (a.dynamic_group(), b.dynamic_group()) {
            total += self.group_sum(&self.metric.dynamic_distances, da, db)?;
        }
        Ok(total)
    }

    fn group_sum(
        &self,
        declared: &BTreeMap<String, DistanceKind>,
        a: &InvariantGroup,
        b: &InvariantGroup,
    ) -> QpxResult<f64> {
        let mut sum = 0.0;
        for (key, distance) in declared {
            let (Some(va), Some(vb)) = (a.get(key), b.get(key)) else {
                continue;
            };
            let d = self.distances.evaluate(key, distance, va, vb)?;
            sum += self.metric.weight(key) * d;
        }
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn metric() -> TopologyMetricSpec {
        TopologyMetricSpec::new()
            .with_static("persistence_entropy", DistanceKind::ABSOLUTE)
            .with_static("betti_curve", DistanceKind::EUCLIDEAN)
            .with_dynamic("spectral_profile", DistanceKind::COSINE)
            .with_weight("betti_curve", 0.5)
    }

    #[test]
    fn weighted_static_sum() {
        let m = metric();
        let registry = DistanceRegistry::standard();
        let agg = TopologyDistance::new(&m, &registry);

        let a = FeatureBundle::new("a").with_static("persistence_entropy", 1.0).with_static("betti_curve", vec![0.0, 0.0]);
        let b = FeatureBundle::new("b").with_static("persistence_entropy", 3.0).with_static("betti_curve", vec![3.0, 4.0]);

        assert_relative_eq!(agg.between(&a, &b).unwrap(), 2.0 + 0.5 * 5.0);
        assert_eq!(agg.between(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn dynamic_group_counts_only_when_both_present() {
        let m = metric();
        let registry = DistanceRegistry::standard();
        let agg = TopologyDistance::new(&m, &registry);

        let a = FeatureBundle::new("a").with_static("persistence_entropy", 1.0).with_dynamic("spectral_profile", vec![1.0, 0.0]);
        let b = FeatureBundle::new("b").with_static("persistence_entropy", 1.0).with_dynamic("spectral_profile", vec![0.0, 1.0]);
        let c = FeatureBundle::new("c").with_static("persistence_entropy", 1.0);

        assert_relative_eq!(agg.between(&a, &b).unwrap(), 1.0);
        assert_eq!(agg.between(&a, &c).unwrap(), 0.0);
        assert_eq!(agg.between(&c, &a).unwrap(), 0.0);
    }

    #[test]
    fn weights_default_to_one() {
        let m = TopologyMetricSpec::new().with_weight("x", 0.0);
        assert_eq!(m.weight("x"), 0.0);
        assert_eq!(m.weight("y"), DEFAULT_WEIGHT);
    }

    #[test]
    fn json_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metric.json");
        let m = metric();
        m.to_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"static\""));
        assert!(text.contains("\"cosine\""));
        assert_eq!(TopologyMetricSpec::from_json(&path).unwrap(), m);
    }
}
