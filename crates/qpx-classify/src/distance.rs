//! Per-invariant distance functions.
//!
//! A distance is selected by the pair `(InvariantKind, DistanceKind)`.
//! [`DistanceRegistry`] owns that table; the aggregator only ever looks a
//! function up, so a new distance is added by registering it here.
//!
//! | kind   | distance    | formula                              |
//! |--------|-------------|--------------------------------------|
//! | scalar | `absolute`  | `|a − b|`                            |
//! | vector | `euclidean` | `‖a − b‖₂`                           |
//! | vector | `frobenius` | `‖a − b‖_F` (flattened diagrams)     |
//! | vector | `cosine`    | `1 − a·b / (‖a‖‖b‖)`, clamped to ≥ 0 |

use qpx_core::{InvariantKind, InvariantValue, QpxError, QpxResult};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// DistanceKind
// ---------------------------------------------------------------------------

/// Open, string-backed distance tag.
///
/// ```rust
/// use qpx_classify::distance::DistanceKind;
///
/// let kind: DistanceKind = serde_json::from_str("\"cosine\"").unwrap();
/// assert_eq!(kind, DistanceKind::COSINE);
/// assert_eq!(DistanceKind::new("wasserstein").as_str(), "wasserstein");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistanceKind(Cow<'static, str>);

impl DistanceKind {
    /// Absolute difference of two scalars.
    pub const ABSOLUTE: DistanceKind = DistanceKind(Cow::Borrowed("absolute"));
    /// Euclidean norm of the elementwise difference.
    pub const EUCLIDEAN: DistanceKind = DistanceKind(Cow::Borrowed("euclidean"));
    /// Frobenius norm of the difference of flattened arrays.
    pub const FROBENIUS: DistanceKind = DistanceKind(Cow::Borrowed("frobenius"));
    /// One minus cosine similarity.
    pub const COSINE: DistanceKind = DistanceKind(Cow::Borrowed("cosine"));

    /// A custom distance tag.
    pub fn new(name: impl Into<String>) -> Self {
        DistanceKind(Cow::Owned(name.into()))
    }

    /// Tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DistanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DistanceKind {
    fn from(name: &str) -> Self {
        DistanceKind::new(name)
    }
}

// ---------------------------------------------------------------------------
// DistanceRegistry
// ---------------------------------------------------------------------------

/// Signature of a per-invariant distance. The first argument is the
/// invariant key, used for error reporting only.
pub type DistanceFn = fn(&str, &InvariantValue, &InvariantValue) -> QpxResult<f64>;

/// Table of legal `(InvariantKind, DistanceKind)` pairs.
#[derive(Clone, Default)]
pub struct DistanceRegistry {
    entries: HashMap<(InvariantKind, DistanceKind), DistanceFn>,
}

impl fmt::Debug for DistanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistanceRegistry").field("pairs", &self.pairs()).finish()
    }
}

impl DistanceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in distances.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with(InvariantKind::Scalar, DistanceKind::ABSOLUTE, absolute)
            .with(InvariantKind::Vector, DistanceKind::EUCLIDEAN, euclidean)
            .with(InvariantKind::Vector, DistanceKind::FROBENIUS, frobenius)
            .with(InvariantKind::Vector, DistanceKind::COSINE, cosine)
    }

    /// Register `f` for `(kind, distance)`, returning any function it replaces.
    pub fn register(&mut self, kind: InvariantKind, distance: DistanceKind, f: DistanceFn) -> Option<DistanceFn> {
        self.entries.insert((kind, distance), f)
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, kind: InvariantKind, distance: DistanceKind, f: DistanceFn) -> Self {
        self.register(kind, distance, f);
        self
    }

    /// Function registered for `(kind, distance)`.
    #[must_use]
    pub fn get(&self, kind: InvariantKind, distance: &DistanceKind) -> Option<DistanceFn> {
        self.entries.get(&(kind, distance.clone())).copied()
    }

    /// Returns `true` when `distance` is legal for `kind`.
    #[must_use]
    pub fn supports(&self, kind: InvariantKind, distance: &DistanceKind) -> bool {
        self.get(kind, distance).is_some()
    }

    /// Distances legal for `kind`, sorted by tag.
    #[must_use]
    pub fn distances_for(&self, kind: InvariantKind) -> Vec<DistanceKind> {
        let mut out: Vec<DistanceKind> =
            self.entries.keys().filter(|(k, _)| *k == kind).map(|(_, d)| d.clone()).collect();
        out.sort();
        out
    }

    /// Every registered pair, sorted.
    #[must_use]
    pub fn pairs(&self) -> Vec<(InvariantKind, DistanceKind)> {
        let mut out: Vec<_> = self.entries.keys().cloned().collect();
        out.sort();
        out
    }

    /// Evaluate `distance` between two values of invariant `key`.
    ///
    /// # Errors
    ///
    /// [`QpxError::MetricIncompatibility`] when the pair is not registered,
    /// otherwise whatever the distance function reports.
    pub fn evaluate(
        &self,
        key: &str,
        distance: &DistanceKind,
        a: &InvariantValue,
        b: &InvariantValue,
    ) -> QpxResult<f64> {
        let f = self.get(a.kind(), distance).ok_or_else(|| {
            QpxError::metric(key, format!("distance `{distance}` is not defined for {} invariants", a.kind()))
        })?;
        f(key, a, b)
    }
}

// ---------------------------------------------------------------------------
// Built-in distances
// ---------------------------------------------------------------------------

fn scalar_operands(key: &str, a: &InvariantValue, b: &InvariantValue) -> QpxResult<(f64, f64)> {
    match (a.as_scalar(), b.as_scalar()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(QpxError::metric(key, "scalar distance applied to a vector invariant")),
    }
}

fn vector_operands<'a>(
    key: &str,
    a: &'a InvariantValue,
    b: &'a InvariantValue,
) -> QpxResult<(&'a [f64], &'a [f64])> {
    let (x, y) = match (a.as_vector(), b.as_vector()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(QpxError::metric(key, "vector distance applied to a scalar invariant")),
    };
    if x.len() != y.len() {
        return Err(QpxError::length_mismatch(key, x.len(), y.len()));
    }
    // Array1 built from Vec / from_shape are always contiguous; fall back to
    // an error rather than copying when a strided view sneaks in.
    match (x.as_slice(), y.as_slice()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(QpxError::metric(key, "vector invariant is not contiguous")),
    }
}

/// `|a − b|` for scalar invariants.
pub fn absolute(key: &str, a: &InvariantValue, b: &InvariantValue) -> QpxResult<f64> {
    let (x, y) = scalar_operands(key, a, b)?;
    Ok((x - y).abs())
}

/// `‖a − b‖₂` for equal-length vector invariants.
pub fn euclidean(key: &str, a: &InvariantValue, b: &InvariantValue) -> QpxResult<f64> {
    let (x, y) = vector_operands(key, a, b)?;
    Ok(squared_difference(x, y).sqrt())
}

/// Frobenius norm of the difference of two flattened arrays.
pub fn frobenius(key: &str, a: &InvariantValue, b: &InvariantValue) -> QpxResult<f64> {
    let (x, y) = vector_operands(key, a, b)?;
    Ok(squared_difference(x, y).sqrt())
}

/// `1 − cos θ`. Two zero vectors are identical (0); one zero vector is
/// orthogonal to everything (1).
pub fn cosine(key: &str, a: &InvariantValue, b: &InvariantValue) -> QpxResult<f64> {
    let (x, y) = vector_operands(key, a, b)?;
    if x == y {
        return Ok(0.0);
    }
    let mut dot = 0.0;
    let mut nx = 0.0;
    let mut ny = 0.0;
    for (p, q) in x.iter().zip(y) {
        dot += p * q;
        nx += p * p;
        ny += q * q;
    }
    match (nx == 0.0, ny == 0.0) {
        (true, true) => Ok(0.0),
        (true, false) | (false, true) => Ok(1.0),
        (false, false) => Ok((1.0 - dot / (nx * ny).sqrt()).max(0.0)),
    }
}

fn squared_difference(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(p, q)| (p - q) * (p - q)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use qpx_core::{DimensionError, InvariantValue};

    fn v(values: &[f64]) -> InvariantValue {
        InvariantValue::from(values.to_vec())
    }

    #[test]
    fn absolute_distance() {
        let d = absolute("gap", &InvariantValue::from(1.5), &InvariantValue::from(-0.5)).unwrap();
        assert_relative_eq!(d, 2.0);
    }

    #[test]
    fn euclidean_distance() {
        let d = euclidean("curve", &v(&[0.0, 0.0]), &v(&[3.0, 4.0])).unwrap();
        assert_relative_eq!(d, 5.0);
    }

    #[test]
    fn euclidean_rejects_length_mismatch() {
        let err = euclidean("curve", &v(&[0.0, 0.0]), &v(&[1.0])).unwrap_err();
        assert!(matches!(
            err,
            QpxError::Dimension(DimensionError::LengthMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn cosine_distance_and_zero_guards() {
        assert_relative_eq!(cosine("c", &v(&[1.0, 0.0]), &v(&[0.0, 2.0])).unwrap(), 1.0);
        assert_relative_eq!(cosine("c", &v(&[1.0, 1.0]), &v(&[2.0, 2.0])).unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(cosine("c", &v(&[-1.0, 0.0]), &v(&[1.0, 0.0])).unwrap(), 2.0);
        assert_eq!(cosine("c", &v(&[0.0, 0.0]), &v(&[0.0, 0.0])).unwrap(), 0.0);
        assert_eq!(cosine("c", &v(&[0.0, 0.0]), &v(&[1.0, 0.0])).unwrap(), 1.0);
    }

    #[test]
    fn distances_are_symmetric() {
        let a = v(&[0.3, -1.7, 2.2]);
        let b = v(&[1.1, 0.4, -0.9]);
        for f in [euclidean as DistanceFn, frobenius, cosine] {
            assert_eq!(f("x", &a, &b).unwrap(), f("x", &b, &a).unwrap());
            assert_eq!(f("x", &a, &a).unwrap(), 0.0);
        }
    }

    #[test]
    fn standard_registry_pairs() {
        let registry = DistanceRegistry::standard();
        assert!(registry.supports(InvariantKind::Scalar, &DistanceKind::ABSOLUTE));
        assert!(!registry.supports(InvariantKind::Scalar, &DistanceKind::EUCLIDEAN));
        assert!(!registry.supports(InvariantKind::Vector, &DistanceKind::ABSOLUTE));
        assert_eq!(
            registry.distances_for(InvariantKind::Vector),
            vec![DistanceKind::COSINE, DistanceKind::EUCLIDEAN, DistanceKind::FROBENIUS]
        );
    }

    #[test]
    fn evaluate_rejects_unregistered_pair() {
        let registry = DistanceRegistry::standard();
        let err = registry
            .evaluate("gap", &DistanceKind::COSINE, &InvariantValue::from(1.0), &InvariantValue::from(2.0))
            .unwrap_err();
        assert!(matches!(err, QpxError::MetricIncompatibility { .. }));
    }

    #[test]
    fn custom_distance_can_be_registered() {
        fn chebyshev(key: &str, a: &InvariantValue, b: &InvariantValue) -> QpxResult<f64> {
            let (x, y) = vector_operands(key, a, b)?;
            Ok(x.iter().zip(y).map(|(p, q)| (p - q).abs()).fold(0.0, f64::max))
        }
        let linf = DistanceKind::new("chebyshev");
        let registry = DistanceRegistry::standard().with(InvariantKind::Vector, linf.clone(), chebyshev);
        let d = registry.evaluate("curve", &linf, &v(&[0.0, 5.0]), &v(&[1.0, 2.0])).unwrap();
        assert_relative_eq!(d, 3.0);
    }
}
