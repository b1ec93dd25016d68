//! k-nearest-neighbour affinity graph.
//!
//! Row `i` of the graph lists the `k` samples closest to `i` (never `i`
//! itself). Neighbour relations are one-directional: `j` may appear in row
//! `i` without `i` appearing in row `j`, and the builder keeps it that way.
//! [`AffinityGraph::symmetrized`] exists for comparison only.
//!
//! Neighbours are ordered by `(distance, index)`, so equal distances always
//! resolve to the lowest sample index.

use ndarray::ArrayView1;
use qpx_core::{ConfigError, QpxError, QpxResult};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::matrix::DistanceMatrix;
use crate::validation::MIN_SAMPLES;

// ---------------------------------------------------------------------------
// Neighbour selection
// ---------------------------------------------------------------------------

/// Indices of the `k` smallest entries of `row`, nearest first, skipping
/// `exclude`. Ties resolve to the lowest index.
///
/// ```rust
/// use ndarray::array;
/// use qpx_classify::graph::k_nearest;
///
/// let row = array![0.0, 2.0, 1.0, 1.0, 5.0];
/// assert_eq!(k_nearest(row.view(), Some(0), 3), vec![2, 3, 1]);
/// assert_eq!(k_nearest(row.view(), None, 2), vec![0, 2]);
/// ```
#[must_use]
pub fn k_nearest(row: ArrayView1<'_, f64>, exclude: Option<usize>, k: usize) -> Vec<usize> {
    let mut candidates: Vec<usize> = (0..row.len()).filter(|&j| Some(j) != exclude).collect();
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }
    let cmp = |a: &usize, b: &usize| row[*a].total_cmp(&row[*b]).then(a.cmp(b));
    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, &cmp);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(&cmp);
    candidates
}

// ---------------------------------------------------------------------------
// KnnGraphBuilder
// ---------------------------------------------------------------------------

/// Builds an [`AffinityGraph`] from a [`DistanceMatrix`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnnGraphBuilder {
    k: usize,
    sigma: Option<f64>,
}

impl KnnGraphBuilder {
    /// Builder for `k` neighbours per row and binary weights.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self { k, sigma: None }
    }

    /// Use Gaussian weights `exp(−d² / 2σ²)` when `sigma` is set.
    #[must_use]
    pub fn with_sigma(mut self, sigma: Option<f64>) -> Self {
        self.sigma = sigma;
        self
    }

    /// Edge weight for a neighbour at distance `d`. Gaussian weights are
    /// clamped to the smallest positive normal so they never underflow to 0.
    #[must_use]
    pub fn weight(&self, d: f64) -> f64 {
        match self.sigma {
            None => 1.0,
            Some(sigma) => (-(d * d) / (2.0 * sigma * sigma)).exp().max(f64::MIN_POSITIVE),
        }
    }

    /// Build the graph. Rows are computed in parallel.
    ///
    /// # Errors
    ///
    /// [`DimensionError::OutOfRange`](qpx_core::DimensionError::OutOfRange)
    /// when `N < 3` or `k ∉ [1, N−2]`, [`QpxError::Config`] for a
    /// non-positive `sigma`.
    #[instrument(skip_all, fields(k = self.k, sigma = ?self.sigma))]
    pub fn build(&self, distances: &DistanceMatrix) -> QpxResult<AffinityGraph> {
        let n = distances.len();
        if n < MIN_SAMPLES {
            return Err(QpxError::out_of_range("samples", n, MIN_SAMPLES, usize::MAX));
        }
        if self.k < 1 || self.k > n - 2 {
            return Err(QpxError::out_of_range("k", self.k, 1, n - 2));
        }
        if let Some(sigma) = self.sigma {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(ConfigError::invalid_value("sigma", "must be finite and > 0.0").into());
            }
        }

        let rows: Vec<Vec<(usize, f64)>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let row = distances.row(i);
                k_nearest(row, Some(i), self.k)
                    .into_iter()
                    .map(|j| (j, self.weight(row[j])))
                    .collect()
            })
            .collect();

        let mut tri = TriMat::with_capacity((n, n), n * self.k);
        for (i, row) in rows.iter().enumerate() {
            for &(j, w) in row {
                tri.add_triplet(i, j, w);
            }
        }
        let graph = AffinityGraph { adjacency: tri.to_csr(), k: self.k, sigma: self.sigma };
        debug!(nodes = n, edges = graph.nnz(), "affinity graph built");
        Ok(graph)
    }
}

// ---------------------------------------------------------------------------
// AffinityGraph
// ---------------------------------------------------------------------------

/// Sparse, directed, non-negative kNN adjacency in CSR form.
#[derive(Debug, Clone, PartialEq)]
pub struct AffinityGraph {
    adjacency: CsMat<f64>,
    k: usize,
    sigma: Option<f64>,
}

impl AffinityGraph {
    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adjacency.rows()
    }

    /// Returns `true` for a graph without nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Neighbours per row the graph was built with.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Gaussian bandwidth, if any.
    #[must_use]
    pub fn sigma(&self) -> Option<f64> {
        self.sigma
    }

    /// CSR adjacency matrix `W`.
    #[must_use]
    pub fn adjacency(&self) -> &CsMat<f64> {
        &self.adjacency
    }

    /// Stored edges.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.adjacency.nnz()
    }

    /// Stored edges in row `i`.
    #[must_use]
    pub fn row_nnz(&self, i: usize) -> usize {
        self.adjacency.outer_view(i).map_or(0, |row| row.nnz())
    }

    /// `(column, weight)` pairs of row `i` in column order.
    #[must_use]
    pub fn neighbors(&self, i: usize) -> Vec<(usize, f64)> {
        self.adjacency
            .outer_view(i)
            .map(|row| row.iter().map(|(j, &w)| (j, w)).collect())
            .unwrap_or_default()
    }

    /// Weight of edge `i → j`, 0 when absent.
    #[must_use]
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.adjacency.get(i, j).copied().unwrap_or(0.0)
    }

    /// Row sums `d_i = Σ_j W_ij`.
    #[must_use]
    pub fn degrees(&self) -> Vec<f64> {
        self.adjacency.outer_iterator().map(|row| row.data().iter().sum::<f64>()).collect()
    }

    /// Returns `true` when `W_ij == W_ji` for every stored edge.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.adjacency.outer_iterator().enumerate().all(|(i, row)| {
            row.iter().all(|(j, &w)| self.adjacency.get(j, i).is_some_and(|&back| back == w))
        })
    }

    /// Undirected variant: an edge exists when either direction was
    /// selected, weighted by the larger of the two weights.
    #[must_use]
    pub fn symmetrized(&self) -> AffinityGraph {
        let n = self.len();
        let mut edges: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (i, row) in self.adjacency.outer_iterator().enumerate() {
            for (j, &w) in row.iter() {
                for key in [(i, j), (j, i)] {
                    let slot = edges.entry(key).or_insert(w);
                    *slot = slot.max(w);
                }
            }
        }
        let mut tri = TriMat::with_capacity((n, n), edges.len());
        for ((i, j), w) in edges {
            tri.add_triplet(i, j, w);
        }
        AffinityGraph { adjacency: tri.to_csr(), k: self.k, sigma: self.sigma }
    }

    /// Number of weakly connected components.
    #[must_use]
    pub fn connected_components(&self) -> usize {
        let n = self.len();
        let mut parent: Vec<usize> = (0..n).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        let mut components = n;
        for (i, row) in self.adjacency.outer_iterator().enumerate() {
            for (j, _) in row.iter() {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                    components -= 1;
                }
            }
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn line(n: usize) -> DistanceMatrix {
        DistanceMatrix::from_array(Array2::from_shape_fn((n, n), |(i, j)| (i as f64 - j as f64).abs())).unwrap()
    }

    #[test]
    fn rows_have_exactly_k_neighbours_without_self() {
        let graph = KnnGraphBuilder::new(3).build(&line(8)).unwrap();
        for i in 0..8 {
            assert_eq!(graph.row_nnz(i), 3);
            assert_eq!(graph.weight(i, i), 0.0);
        }
        assert_eq!(graph.nnz(), 24);
    }

    #[test]
    fn binary_weights_are_exactly_one() {
        let graph = KnnGraphBuilder::new(2).build(&line(6)).unwrap();
        assert!(graph.adjacency().data().iter().all(|&w| w == 1.0));
    }

    #[test]
    fn gaussian_weights_in_unit_interval() {
        let graph = KnnGraphBuilder::new(2).with_sigma(Some(0.5)).build(&line(6)).unwrap();
        for &w in graph.adjacency().data() {
            assert!(w > 0.0 && w <= 1.0);
        }
        assert_relative_eq!(graph.weight(0, 1), (-1.0f64 / 0.5).exp());
    }

    #[test]
    fn far_gaussian_weights_do_not_underflow() {
        let builder = KnnGraphBuilder::new(1).with_sigma(Some(1e-3));
        assert_eq!(builder.weight(1e3), f64::MIN_POSITIVE);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        // 0 is equidistant from 1 and 2 and from 3 and 4.
        let d = ndarray::array![
            [0.0, 1.0, 1.0, 2.0, 2.0],
            [1.0, 0.0, 1.0, 1.0, 3.0],
            [1.0, 1.0, 0.0, 3.0, 1.0],
            [2.0, 1.0, 3.0, 0.0, 4.0],
            [2.0, 3.0, 1.0, 4.0, 0.0],
        ];
        let graph = KnnGraphBuilder::new(3).build(&DistanceMatrix::from_array(d).unwrap()).unwrap();
        let cols: Vec<usize> = graph.neighbors(0).into_iter().map(|(j, _)| j).collect();
        assert_eq!(cols, vec![1, 2, 3]);
    }

    #[test]
    fn one_directional_edges_are_kept() {
        // 3 is far from everyone; it picks 2, but nobody picks 3.
        let d = ndarray::array![
            [0.0, 1.0, 1.0, 9.0],
            [1.0, 0.0, 1.0, 9.0],
            [1.0, 1.0, 0.0, 8.0],
            [9.0, 9.0, 8.0, 0.0],
        ];
        let graph = KnnGraphBuilder::new(1).build(&DistanceMatrix::from_array(d).unwrap()).unwrap();
        assert_eq!(graph.weight(3, 2), 1.0);
        assert_eq!(graph.weight(2, 3), 0.0);
        assert!(!graph.is_symmetric());

        let sym = graph.symmetrized();
        assert!(sym.is_symmetric());
        assert_eq!(sym.weight(2, 3), 1.0);
    }

    #[test]
    fn k_out_of_range_is_rejected() {
        let d = line(5);
        assert!(KnnGraphBuilder::new(0).build(&d).is_err());
        assert!(KnnGraphBuilder::new(4).build(&d).is_err());
        assert!(KnnGraphBuilder::new(3).build(&d).is_ok());
        assert!(KnnGraphBuilder::new(1).with_sigma(Some(-1.0)).build(&d).is_err());
    }

    #[test]
    fn degrees_and_components() {
        let d = ndarray::array![
            [0.0, 1.0, 9.0, 9.0],
            [1.0, 0.0, 9.0, 9.0],
            [9.0, 9.0, 0.0, 1.0],
            [9.0, 9.0, 1.0, 0.0],
        ];
        let graph = KnnGraphBuilder::new(1).build(&DistanceMatrix::from_array(d).unwrap()).unwrap();
        assert_eq!(graph.degrees(), vec![1.0; 4]);
        assert_eq!(graph.connected_components(), 2);
        assert_eq!(KnnGraphBuilder::new(2).build(&line(6)).unwrap().connected_components(), 1);
    }
}
