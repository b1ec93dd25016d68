//! Pairwise distance matrix.

use ndarray::{Array2, ArrayView1};
use qpx_core::{FeatureBundle, QpxError, QpxResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::metric::TopologyDistance;

/// Symmetric, zero-diagonal, non-negative N×N distance matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    data: Array2<f64>,
}

impl DistanceMatrix {
    /// Compute every unordered pair once and mirror it.
    ///
    /// Rows of the upper triangle are distributed over the rayon pool; each
    /// task owns its row, so no cell is written twice.
    ///
    /// # Errors
    ///
    /// The first per-pair failure in row order, or
    /// [`QpxError::NumericalDegeneracy`] for a negative or non-finite
    /// distance.
    #[instrument(skip_all, fields(samples = features.len()))]
    pub fn compute(features: &[FeatureBundle], distance: &TopologyDistance<'_>) -> QpxResult<Self> {
        let n = features.len();
        let rows: Vec<QpxResult<Vec<f64>>> = (0..n)
            .into_par_iter()
            .map(|i| {
                ((i + 1)..n)
                    .map(|j| distance.between(&features[i], &features[j]))
                    .collect::<QpxResult<Vec<f64>>>()
            })
            .collect();

        let mut data = Array2::<f64>::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (offset, d) in row?.into_iter().enumerate() {
                let j = i + 1 + offset;
                if !d.is_finite() || d < 0.0 {
                    return Err(QpxError::degenerate(format!(
                        "distance between samples {i} and {j} is {d}"
                    )));
                }
                data[[i, j]] = d;
                data[[j, i]] = d;
            }
        }
        debug!(pairs = n * n.saturating_sub(1) / 2, "distance matrix computed");
        Ok(Self { data })
    }

    /// Wrap a precomputed matrix after checking it is square, symmetric,
    /// finite, non-negative and zero on the diagonal.
    ///
    /// # Errors
    ///
    /// [`QpxError::Dimension`] when the matrix is not square,
    /// [`QpxError::SchemaInconsistency`] naming the first offending row
    /// otherwise.
    pub fn from_array(data: Array2<f64>) -> QpxResult<Self> {
        let (rows, cols) = data.dim();
        if rows != cols {
            return Err(QpxError::length_mismatch("distance_matrix", rows, cols));
        }
        for i in 0..rows {
            if data[[i, i]] != 0.0 {
                return Err(QpxError::schema(i, "distance matrix diagonal must be zero"));
            }
            for j in (i + 1)..cols {
                let d = data[[i, j]];
                if !d.is_finite() || d < 0.0 {
                    return Err(QpxError::schema(i, format!("distance to {j} is {d}")));
                }
                if d != data[[j, i]] {
                    return Err(QpxError::schema(i, format!("distance to {j} is not symmetric")));
                }
            }
        }
        Ok(Self { data })
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    /// Returns `true` for a 0×0 matrix.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Distance between samples `i` and `j`.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[[i, j]]
    }

    /// Distances from sample `i` to every sample.
    #[must_use]
    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.data.row(i)
    }

    /// Borrow the underlying array.
    #[must_use]
    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }

    /// Take ownership of the underlying array.
    #[must_use]
    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{DistanceKind, DistanceRegistry};
    use crate::metric::TopologyMetricSpec;
    use ndarray::array;

    #[test]
    fn computed_matrix_is_symmetric_with_zero_diagonal() {
        let features: Vec<FeatureBundle> = (0..6)
            .map(|i| {
                let x = i as f64;
                FeatureBundle::new(format!("s{i}"))
                    .with_static("gap", x * 0.7)
                    .with_static("curve", vec![x.sin(), x.cos(), x])
            })
            .collect();
        let metric = TopologyMetricSpec::new()
            .with_static("gap", DistanceKind::ABSOLUTE)
            .with_static("curve", DistanceKind::COSINE);
        let registry = DistanceRegistry::standard();
        let m = DistanceMatrix::compute(&features, &TopologyDistance::new(&metric, &registry)).unwrap();

        assert_eq!(m.len(), 6);
        for i in 0..6 {
            assert_eq!(m.get(i, i), 0.0);
            for j in 0..6 {
                assert_eq!(m.get(i, j), m.get(j, i));
                assert!(m.get(i, j) >= 0.0);
            }
        }
        assert!(m.get(0, 5) > 0.0);
    }

    #[test]
    fn from_array_validates() {
        assert!(DistanceMatrix::from_array(array![[0.0, 1.0], [1.0, 0.0]]).is_ok());
        assert!(DistanceMatrix::from_array(array![[0.0, 1.0], [2.0, 0.0]]).is_err());
        assert!(DistanceMatrix::from_array(array![[1.0, 1.0], [1.0, 0.0]]).is_err());
        assert!(DistanceMatrix::from_array(array![[0.0, -1.0], [-1.0, 0.0]]).is_err());
        assert!(DistanceMatrix::from_array(Array2::zeros((2, 3))).is_err());
    }
}
