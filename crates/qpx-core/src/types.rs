//! Core data types for excitation classification.
//!
//! # Types
//!
//! - [`InvariantKind`] / [`InvariantValue`]: the scalar or vector descriptors
//!   an extractor produces for one sample.
//! - [`FeatureBundle`]: the immutable per-sample collection of invariants,
//!   split into a static group and an optional dynamic group.
//! - [`IntensityData`]: a spectroscopic intensity cube with named axes.
//! - [`ModelHypothesis`], [`QuerySpec`], [`FeatureSpec`]: inputs of the
//!   external simulation and extraction contracts.

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{QpxError, QpxResult};

/// A named group of invariants, ordered by key for deterministic iteration.
pub type InvariantGroup = BTreeMap<String, InvariantValue>;

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

/// Semantic kind of a registered invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantKind {
    /// A single real number (e.g. persistence entropy).
    Scalar,
    /// A fixed-length real vector (e.g. a sampled Betti curve).
    Vector,
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Vector => write!(f, "vector"),
        }
    }
}

/// Value of one invariant for one sample.
///
/// Serialized as a bare JSON number (scalar) or a bare JSON array (vector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvariantValue {
    /// Scalar invariant value.
    Scalar(f64),
    /// Vector invariant value.
    Vector(#[serde(with = "array1_as_seq")] Array1<f64>),
}

impl InvariantValue {
    /// Kind of this value.
    #[must_use]
    pub fn kind(&self) -> InvariantKind {
        match self {
            Self::Scalar(_) => InvariantKind::Scalar,
            Self::Vector(_) => InvariantKind::Vector,
        }
    }

    /// Number of components: 1 for scalars, the vector length otherwise.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector(v) => v.len(),
        }
    }

    /// Returns `true` for an empty vector.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar payload, if any.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(x) => Some(*x),
            Self::Vector(_) => None,
        }
    }

    /// Vector payload, if any.
    #[must_use]
    pub fn as_vector(&self) -> Option<&Array1<f64>> {
        match self {
            Self::Scalar(_) => None,
            Self::Vector(v) => Some(v),
        }
    }

    /// Returns `true` when every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Scalar(x) => x.is_finite(),
            Self::Vector(v) => v.iter().all(|x| x.is_finite()),
        }
    }
}

impl From<f64> for InvariantValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for InvariantValue {
    fn from(value: Vec<f64>) -> Self {
        Self::Vector(Array1::from(value))
    }
}

impl From<Array1<f64>> for InvariantValue {
    fn from(value: Array1<f64>) -> Self {
        Self::Vector(value)
    }
}

mod array1_as_seq {
    use ndarray::Array1;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Array1<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(value.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array1<f64>, D::Error> {
        Vec::<f64>::deserialize(deserializer).map(Array1::from)
    }
}

// ---------------------------------------------------------------------------
// FeatureBundle
// ---------------------------------------------------------------------------

/// Where a feature bundle came from.
///
/// The `extra` map is passed through untouched; the classifier never reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Identifier of the raw data source (instrument run, simulation id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// When the bundle was extracted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,

    /// Free-form passthrough metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Provenance {
    /// Provenance with only a source identifier.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self { source: Some(source.into()), ..Self::default() }
    }
}

/// Per-sample collection of named invariants.
///
/// Produced once by an external extractor and consumed read-only by the
/// classifier. Construct with [`FeatureBundle::new`] and the `with_*`
/// builder methods.
///
/// ```rust
/// use qpx_core::FeatureBundle;
///
/// let bundle = FeatureBundle::new("scan-017")
///     .with_static("persistence_entropy", 0.83)
///     .with_static("betti_curve", vec![3.0, 2.0, 1.0]);
///
/// assert_eq!(bundle.static_group().len(), 2);
/// assert!(bundle.dynamic_group().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    id: String,
    #[serde(rename = "static")]
    static_group: InvariantGroup,
    #[serde(rename = "dynamic", default, skip_serializing_if = "Option::is_none")]
    dynamic_group: Option<InvariantGroup>,
    #[serde(default)]
    provenance: Provenance,
}

impl FeatureBundle {
    /// Empty bundle with the given sample id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            static_group: InvariantGroup::new(),
            dynamic_group: None,
            provenance: Provenance::default(),
        }
    }

    /// Add (or replace) a static invariant.
    #[must_use]
    pub fn with_static(mut self, key: impl Into<String>, value: impl Into<InvariantValue>) -> Self {
        self.static_group.insert(key.into(), value.into());
        self
    }

    /// Add (or replace) a dynamic invariant, creating the dynamic group.
    #[must_use]
    pub fn with_dynamic(mut self, key: impl Into<String>, value: impl Into<InvariantValue>) -> Self {
        self.dynamic_group
            .get_or_insert_with(InvariantGroup::new)
            .insert(key.into(), value.into());
        self
    }

    /// Attach provenance metadata.
    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Sample identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Static invariant group.
    #[must_use]
    pub fn static_group(&self) -> &InvariantGroup {
        &self.static_group
    }

    /// Dynamic invariant group, if the extractor produced one.
    #[must_use]
    pub fn dynamic_group(&self) -> Option<&InvariantGroup> {
        self.dynamic_group.as_ref()
    }

    /// Provenance metadata.
    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Look up a static invariant.
    #[must_use]
    pub fn static_value(&self, key: &str) -> Option<&InvariantValue> {
        self.static_group.get(key)
    }

    /// Look up a dynamic invariant.
    #[must_use]
    pub fn dynamic_value(&self, key: &str) -> Option<&InvariantValue> {
        self.dynamic_group.as_ref().and_then(|g| g.get(key))
    }
}

// ---------------------------------------------------------------------------
// IntensityData
// ---------------------------------------------------------------------------

/// One named coordinate axis of an intensity cube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisCoordinates {
    /// Axis name, e.g. `"energy_mev"` or `"q_h"`.
    pub name: String,
    /// Coordinate of every slice along this axis.
    pub values: Vec<f64>,
}

impl AxisCoordinates {
    /// New axis.
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self { name: name.into(), values }
    }

    fn is_strictly_monotone(&self) -> bool {
        let increasing = self.values.windows(2).all(|w| w[1] > w[0]);
        let decreasing = self.values.windows(2).all(|w| w[1] < w[0]);
        increasing || decreasing
    }
}

/// A spectroscopic intensity cube `I[a, b, c]` over three named axes.
///
/// Deserialization runs the same checks as [`IntensityData::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawIntensityData")]
pub struct IntensityData {
    intensity: Array3<f64>,
    axes: [AxisCoordinates; 3],
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, serde_json::Value>,
}

/// Unchecked wire form of [`IntensityData`].
#[derive(Deserialize)]
struct RawIntensityData {
    intensity: Array3<f64>,
    axes: [AxisCoordinates; 3],
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<RawIntensityData> for IntensityData {
    type Error = QpxError;

    fn try_from(raw: RawIntensityData) -> QpxResult<Self> {
        let mut data = Self::new(raw.intensity, raw.axes)?;
        data.metadata = raw.metadata;
        Ok(data)
    }
}

impl IntensityData {
    /// Wrap an intensity cube with its coordinate axes.
    ///
    /// # Errors
    ///
    /// Returns [`QpxError::Dimension`] when an axis length differs from the
    /// matching cube dimension, and [`QpxError::SchemaInconsistency`] when an
    /// axis is not strictly monotone or the cube holds non-finite values.
    pub fn new(intensity: Array3<f64>, axes: [AxisCoordinates; 3]) -> QpxResult<Self> {
        let shape = intensity.shape();
        for (dim, axis) in axes.iter().enumerate() {
            if axis.values.len() != shape[dim] {
                return Err(QpxError::length_mismatch(axis.name.clone(), shape[dim], axis.values.len()));
            }
            if !axis.is_strictly_monotone() {
                return Err(QpxError::schema(0, format!("axis `{}` is not strictly monotone", axis.name)));
            }
        }
        if intensity.iter().any(|x| !x.is_finite()) {
            return Err(QpxError::schema(0, "intensity cube contains non-finite values"));
        }
        Ok(Self { intensity, axes, metadata: BTreeMap::new() })
    }

    /// Attach passthrough metadata.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The intensity cube.
    #[must_use]
    pub fn intensity(&self) -> &Array3<f64> {
        &self.intensity
    }

    /// Coordinate axes in cube-dimension order.
    #[must_use]
    pub fn axes(&self) -> &[AxisCoordinates; 3] {
        &self.axes
    }

    /// Passthrough metadata.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Sum of all intensities.
    #[must_use]
    pub fn total_intensity(&self) -> f64 {
        self.intensity.sum()
    }
}

// ---------------------------------------------------------------------------
// Collaborator inputs
// ---------------------------------------------------------------------------

/// A model hypothesis handed to the forward simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHypothesis {
    /// Hypothesis name, e.g. `"heisenberg_afm"`.
    pub name: String,
    /// Named model parameters (exchange constants, anisotropies, ...).
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

impl ModelHypothesis {
    /// Hypothesis without parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), parameters: BTreeMap::new() }
    }

    /// Set a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Linear grid along one query axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisGrid {
    /// Axis name.
    pub name: String,
    /// First coordinate.
    pub start: f64,
    /// Last coordinate (inclusive).
    pub stop: f64,
    /// Number of points, at least 2.
    pub points: usize,
}

impl AxisGrid {
    /// Sampled coordinates of this grid.
    ///
    /// # Errors
    ///
    /// Returns [`QpxError::Dimension`] when fewer than two points are
    /// requested and [`QpxError::SchemaInconsistency`] when the endpoints
    /// coincide or are not finite.
    pub fn coordinates(&self) -> QpxResult<AxisCoordinates> {
        if self.points < 2 {
            return Err(QpxError::out_of_range("points", self.points, 2, usize::MAX));
        }
        if !self.start.is_finite() || !self.stop.is_finite() || self.start == self.stop {
            return Err(QpxError::schema(0, format!("axis `{}` has a degenerate range", self.name)));
        }
        let step = (self.stop - self.start) / (self.points - 1) as f64;
        let values = (0..self.points).map(|i| self.start + step * i as f64).collect();
        Ok(AxisCoordinates::new(self.name.clone(), values))
    }
}

/// Where in reciprocal space / energy the simulator should evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// One grid per cube dimension.
    pub axes: [AxisGrid; 3],
}

/// Which invariants the extractor should produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Invariants for the static group.
    pub static_invariants: Vec<String>,
    /// Invariants for the dynamic group; empty means no dynamic group.
    #[serde(default)]
    pub dynamic_invariants: Vec<String>,
    /// Extractor-specific numeric parameters (filtration scale, bins, ...).
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}
