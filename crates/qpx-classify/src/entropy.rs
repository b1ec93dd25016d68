//! Neighbourhood label entropy, confidence and ambiguity.
//!
//! For every sample the labels of its `k` nearest neighbours (self
//! excluded) form a histogram over `nclusters` bins. The Shannon entropy of
//! that histogram, in nats, measures local disagreement:
//!
//! ```text
//! H_i          = −Σ_c p_c ln p_c        (empty bins contribute nothing)
//! confidence_i = 1 / (1 + H_i)          ∈ (0, 1]
//! ambiguous_i  = H_i > 0.5 · ln(nclusters)
//! ```
//!
//! The scores are diagnostic only and never feed back into clustering.

use qpx_core::{QpxError, QpxResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::k_nearest;
use crate::matrix::DistanceMatrix;

/// Entropy above which a sample is ambiguous: `0.5 · ln(nclusters)`.
#[must_use]
pub fn ambiguity_threshold(nclusters: usize) -> f64 {
    0.5 * (nclusters as f64).ln()
}

/// Strict comparison: an entropy equal to the threshold is not ambiguous.
///
/// ```rust
/// use qpx_classify::entropy::{ambiguity_threshold, is_ambiguous};
///
/// let t = ambiguity_threshold(4);
/// assert!(!is_ambiguous(t, t));
/// assert!(is_ambiguous(t + 1e-9, t));
/// ```
#[must_use]
pub fn is_ambiguous(entropy: f64, threshold: f64) -> bool {
    entropy > threshold
}

/// `1 / (1 + entropy)`.
#[must_use]
pub fn confidence(entropy: f64) -> f64 {
    1.0 / (1.0 + entropy)
}

/// Shannon entropy (natural log) of a histogram.
#[must_use]
pub fn shannon_entropy(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let mut h = 0.0;
    for &count in counts.iter().filter(|&&c| c > 0) {
        let p = count as f64 / total;
        h -= p * p.ln();
    }
    h
}

/// Per-sample uncertainty scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodScores {
    /// Neighbourhood label entropy per sample.
    pub entropy: Vec<f64>,
    /// `1 / (1 + entropy)` per sample.
    pub confidence: Vec<f64>,
    /// `entropy > threshold` per sample.
    pub ambiguous: Vec<bool>,
    /// Ambiguity threshold used.
    pub threshold: f64,
}

impl NeighborhoodScores {
    /// Number of ambiguous samples.
    #[must_use]
    pub fn ambiguous_count(&self) -> usize {
        self.ambiguous.iter().filter(|&&a| a).count()
    }
}

/// Neighbourhood entropy estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborhoodEntropy {
    k: usize,
    nclusters: usize,
}

impl NeighborhoodEntropy {
    /// Estimator over `k` neighbours and `nclusters` label bins.
    #[must_use]
    pub fn new(k: usize, nclusters: usize) -> Self {
        Self { k, nclusters }
    }

    /// Neighbours of sample `i`: the `k + 1` nearest including `i`, then `i`
    /// removed. If `i` did not make the cut (duplicates at distance 0 with
    /// lower indices) the farthest selected sample is dropped instead.
    #[must_use]
    pub fn neighbours(&self, distances: &DistanceMatrix, i: usize) -> Vec<usize> {
        let mut selected = k_nearest(distances.row(i), None, self.k + 1);
        match selected.iter().position(|&j| j == i) {
            Some(pos) => {
                selected.remove(pos);
            }
            None => {
                selected.pop();
            }
        }
        selected
    }

    /// Score every sample. Rows are processed in parallel.
    ///
    /// # Errors
    ///
    /// [`QpxError::Dimension`] when `labels` does not match the matrix,
    /// a label is out of range, or `k ∉ [1, N−1]`.
    pub fn compute(&self, distances: &DistanceMatrix, labels: &[usize]) -> QpxResult<NeighborhoodScores> {
        let n = distances.len();
        if labels.len() != n {
            return Err(QpxError::length_mismatch("labels", n, labels.len()));
        }
        if self.nclusters == 0 {
            return Err(QpxError::out_of_range("nclusters", 0, 1, n.max(1)));
        }
        if self.k < 1 || self.k + 1 > n {
            return Err(QpxError::out_of_range("k", self.k, 1, n.saturating_sub(1)));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= self.nclusters) {
            return Err(QpxError::out_of_range("label", bad, 0, self.nclusters - 1));
        }

        let entropy: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut counts = vec![0usize; self.nclusters];
                for j in self.neighbours(distances, i) {
                    counts[labels[j]] += 1;
                }
                shannon_entropy(&counts)
            })
            .collect();

        let threshold = ambiguity_threshold(self.nclusters);
        let scores = NeighborhoodScores {
            confidence: entropy.iter().map(|&h| confidence(h)).collect(),
            ambiguous: entropy.iter().map(|&h| is_ambiguous(h, threshold)).collect(),
            entropy,
            threshold,
        };
        debug!(ambiguous = scores.ambiguous_count(), threshold, "neighbourhood entropy computed");
        Ok(scores)
    }
}
