//! Normalized-cut spectral clustering of an affinity graph.
//!
//! 1. `L = I − D^{-1/2} W D^{-1/2}` ([`NormalizedLaplacian`]).
//! 2. The `min(nclusters + 1, N)` smallest eigenpairs of `L`
//!    ([`SubspaceEigensolver`]), ascending.
//! 3. The first `nclusters` eigenvectors as an `N × nclusters` embedding,
//!    each row scaled to unit length.
//! 4. k-means on the rows ([`KMeans`]).
//!
//! The eigenvalue after the last one used is kept so the eigengap
//! `λ[nclusters] − λ[nclusters − 1]` can be reported.

use ndarray::{Array2, Axis, Slice};
use qpx_core::{QpxError, QpxResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::{ClassifierConfig, EigenSolverConfig, KMeansConfig};
use crate::eigen::SubspaceEigensolver;
use crate::graph::AffinityGraph;
use crate::kmeans::KMeans;
use crate::laplacian::NormalizedLaplacian;

/// Gap between the last eigenvalue used and the next one, 0 when the next
/// one was not computed.
///
/// ```rust
/// use qpx_classify::spectral::eigengap;
///
/// assert_eq!(eigengap(&[0.0, 0.0, 0.5, 0.9], 3), 0.9 - 0.5);
/// assert_eq!(eigengap(&[0.0, 0.0, 0.5], 3), 0.0);
/// ```
#[must_use]
pub fn eigengap(eigenvalues: &[f64], nclusters: usize) -> f64 {
    match (nclusters.checked_sub(1).and_then(|i| eigenvalues.get(i)), eigenvalues.get(nclusters)) {
        (Some(&last_used), Some(&next)) => next - last_used,
        _ => 0.0,
    }
}

/// Divide every row by `‖row‖ + epsilon`.
pub fn row_normalize(embedding: &mut Array2<f64>, epsilon: f64) {
    for mut row in embedding.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        row.mapv_inplace(|v| v / (norm + epsilon));
    }
}

/// Eigensolver statistics carried into the report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverStats {
    /// Block iterations performed.
    pub iterations: usize,
    /// Whether every residual reached the tolerance.
    pub converged: bool,
    /// Largest residual of the returned pairs.
    pub max_residual: f64,
}

/// Output of [`SpectralClustering::fit`].
#[derive(Debug, Clone)]
pub struct SpectralAssignment {
    /// Cluster label per sample, in `[0, nclusters)`.
    pub labels: Vec<usize>,
    /// Retained Laplacian eigenvalues, ascending.
    pub eigenvalues: Vec<f64>,
    /// Row-normalized `N × nclusters` embedding.
    pub embedding: Array2<f64>,
    /// See [`eigengap`].
    pub eigengap: f64,
    /// Eigensolver statistics.
    pub solver: SolverStats,
    /// k-means inertia of the chosen run.
    pub inertia: f64,
}

/// Spectral clustering engine.
#[derive(Debug, Clone)]
pub struct SpectralClustering {
    nclusters: usize,
    degree_epsilon: f64,
    embedding_epsilon: f64,
    eigen: EigenSolverConfig,
    kmeans: KMeansConfig,
}

impl SpectralClustering {
    /// Engine for `nclusters` clusters with default numerical settings.
    #[must_use]
    pub fn new(nclusters: usize) -> Self {
        Self::from_config(&ClassifierConfig { nclusters, ..ClassifierConfig::default() })
    }

    /// Engine configured from a [`ClassifierConfig`].
    #[must_use]
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            nclusters: config.nclusters,
            degree_epsilon: config.degree_epsilon,
            embedding_epsilon: config.embedding_epsilon,
            eigen: config.eigen.clone(),
            kmeans: config.kmeans.clone(),
        }
    }

    /// Cluster the graph's nodes.
    ///
    /// # Errors
    ///
    /// [`DimensionError::OutOfRange`](qpx_core::DimensionError::OutOfRange)
    /// when `nclusters ∉ [1, N]`, [`QpxError::NumericalDegeneracy`] from
    /// the eigensolver.
    #[instrument(skip_all, fields(nodes = graph.len(), nclusters = self.nclusters))]
    pub fn fit<R: Rng>(&self, graph: &AffinityGraph, rng: &mut R) -> QpxResult<SpectralAssignment> {
        let n = graph.len();
        if self.nclusters < 1 || self.nclusters > n {
            return Err(QpxError::out_of_range("nclusters", self.nclusters, 1, n.max(1)));
        }

        let laplacian = NormalizedLaplacian::new(graph, self.degree_epsilon);
        let nev = (self.nclusters + 1).min(n);
        let decomposition = SubspaceEigensolver::new(self.eigen.clone()).smallest(&laplacian, nev, rng)?;

        let mut embedding = decomposition.eigenvectors.slice_axis(Axis(1), Slice::from(..self.nclusters)).to_owned();
        row_normalize(&mut embedding, self.embedding_epsilon);

        let fit = KMeans::new(self.nclusters, self.kmeans.clone()).fit(embedding.view(), rng)?;
        let gap = eigengap(&decomposition.eigenvalues, self.nclusters);
        info!(
            eigengap = gap,
            solver_iterations = decomposition.iterations,
            converged = decomposition.converged,
            "spectral clustering complete"
        );

        Ok(SpectralAssignment {
            labels: fit.labels,
            eigenvalues: decomposition.eigenvalues,
            embedding,
            eigengap: gap,
            solver: SolverStats {
                iterations: decomposition.iterations,
                converged: decomposition.converged,
                max_residual: decomposition.max_residual,
            },
            inertia: fit.inertia,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::KnnGraphBuilder;
    use crate::matrix::DistanceMatrix;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn grouped_line(groups: usize, size: usize, k: usize) -> AffinityGraph {
        let positions: Vec<f64> =
            (0..groups * size).map(|i| (i / size) as f64 * 100.0 + (i % size) as f64 * 0.5).collect();
        let n = positions.len();
        let d = Array2::from_shape_fn((n, n), |(i, j)| (positions[i] - positions[j]).abs());
        KnnGraphBuilder::new(k).build(&DistanceMatrix::from_array(d).unwrap()).unwrap()
    }

    #[test]
    fn row_normalize_gives_unit_rows() {
        let mut m = ndarray::array![[3.0, 4.0], [0.0, 0.0], [1.0, 0.0]];
        row_normalize(&mut m, 0.0);
        assert_relative_eq!(m[[0, 0]], 0.6);
        assert_relative_eq!(m[[0, 1]], 0.8);
        assert!(m[[1, 0]].is_nan());

        let mut z = ndarray::array![[0.0, 0.0]];
        row_normalize(&mut z, 1e-12);
        assert_eq!(z[[0, 0]], 0.0);
    }

    #[test]
    fn eigengap_needs_the_next_eigenvalue() {
        assert_eq!(eigengap(&[0.0, 0.3], 1), 0.3);
        assert_eq!(eigengap(&[0.0], 1), 0.0);
        assert_eq!(eigengap(&[], 0), 0.0);
    }

    #[test]
    fn separates_disconnected_groups() {
        let graph = grouped_line(3, 12, 3);
        let mut rng = StdRng::seed_from_u64(42);
        let out = SpectralClustering::new(3).fit(&graph, &mut rng).unwrap();

        assert_eq!(out.eigenvalues.len(), 4);
        assert_eq!(out.embedding.dim(), (36, 3));
        for group in out.labels.chunks(12) {
            assert!(group.iter().all(|&l| l == group[0]));
        }
        let mut firsts: Vec<usize> = out.labels.chunks(12).map(|g| g[0]).collect();
        firsts.sort_unstable();
        assert_eq!(firsts, vec![0, 1, 2]);
        assert!(out.eigengap > 1e-3);
    }

    #[test]
    fn labels_in_range_for_single_cluster() {
        let graph = grouped_line(1, 10, 3);
        let out = SpectralClustering::new(1).fit(&graph, &mut StdRng::seed_from_u64(0)).unwrap();
        assert!(out.labels.iter().all(|&l| l == 0));
        assert_eq!(out.embedding.ncols(), 1);
    }

    #[test]
    fn too_many_clusters_is_rejected() {
        let graph = grouped_line(1, 5, 2);
        assert!(SpectralClustering::new(6).fit(&graph, &mut StdRng::seed_from_u64(0)).is_err());
    }
}
