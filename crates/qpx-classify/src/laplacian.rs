//! Symmetric normalized graph Laplacian.
//!
//! `L = I − D^{-1/2} W D^{-1/2}` where `D = diag(d)` and `d_i = Σ_j W_ij`.
//! `d^{-1/2}` is taken as `1 / sqrt(d + ε)`, so isolated nodes do not divide
//! by zero. Only the normalized adjacency `S = D^{-1/2} W D^{-1/2}` is
//! stored; `L` and the shifted operator `2I − L = I + S` are applied to dense
//! blocks without ever being materialised.

use ndarray::Array2;
use sprs::{CsMat, TriMat};
use tracing::debug;

use crate::graph::AffinityGraph;

/// Normalized Laplacian of an [`AffinityGraph`].
#[derive(Debug, Clone)]
pub struct NormalizedLaplacian {
    normalized: CsMat<f64>,
    inv_sqrt_degree: Vec<f64>,
    isolated: usize,
}

impl NormalizedLaplacian {
    /// Build from the graph's weights with degree guard `epsilon`.
    #[must_use]
    pub fn new(graph: &AffinityGraph, epsilon: f64) -> Self {
        let n = graph.len();
        let degrees = graph.degrees();
        let isolated = degrees.iter().filter(|&&d| d == 0.0).count();
        let inv_sqrt_degree: Vec<f64> = degrees.iter().map(|&d| 1.0 / (d + epsilon).sqrt()).collect();

        let mut tri = TriMat::with_capacity((n, n), graph.nnz());
        for (i, row) in graph.adjacency().outer_iterator().enumerate() {
            for (j, &w) in row.iter() {
                tri.add_triplet(i, j, inv_sqrt_degree[i] * w * inv_sqrt_degree[j]);
            }
        }
        if isolated > 0 {
            debug!(isolated, "graph has nodes with zero degree");
        }
        Self { normalized: tri.to_csr(), inv_sqrt_degree, isolated }
    }

    /// Dimension `N`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.normalized.rows()
    }

    /// Returns `true` for an empty operator.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nodes whose degree is exactly zero.
    #[must_use]
    pub fn isolated_nodes(&self) -> usize {
        self.isolated
    }

    /// `1 / sqrt(d_i + ε)` per node.
    #[must_use]
    pub fn inv_sqrt_degree(&self) -> &[f64] {
        &self.inv_sqrt_degree
    }

    /// Normalized adjacency `S = D^{-1/2} W D^{-1/2}`.
    #[must_use]
    pub fn normalized_adjacency(&self) -> &CsMat<f64> {
        &self.normalized
    }

    /// `S · X` for a dense `N × p` block.
    fn adjacency_times(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros(x.raw_dim());
        for (i, row) in self.normalized.outer_iterator().enumerate() {
            let mut out_row = out.row_mut(i);
            for (j, &s) in row.iter() {
                out_row.scaled_add(s, &x.row(j));
            }
        }
        out
    }

    /// `L · X`.
    #[must_use]
    pub fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        x - &self.adjacency_times(x)
    }

    /// `(2I − L) · X = X + S · X`. Its eigenvalues are `2 − λ(L)`, so the
    /// smallest Laplacian eigenvalues become the dominant ones.
    #[must_use]
    pub fn apply_shifted(&self, x: &Array2<f64>) -> Array2<f64> {
        x + &self.adjacency_times(x)
    }

    /// Dense copy of `L`, for inspection and small problems.
    #[must_use]
    pub fn to_dense(&self) -> Array2<f64> {
        self.apply(&Array2::eye(self.len()))
    }
}
