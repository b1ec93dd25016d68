//! Lloyd's k-means over the rows of a dense embedding.
//!
//! Centres are initialised by sampling distinct rows uniformly, or with
//! k-means++ seeding when [`KMeansInit::PlusPlus`] is configured. Each
//! iteration assigns every row to its nearest centre by squared Euclidean
//! distance (ties go to the lowest centre index) and moves every centre to
//! the mean of its rows. A centre that lost all of its rows stays where it
//! was. Iteration stops early once an assignment pass changes no label,
//! which is bitwise reproducible. With `n_init > 1` the run with the lowest
//! inertia wins; earlier runs win ties.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use qpx_core::{QpxError, QpxResult};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::index;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{KMeansConfig, KMeansInit};

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansFit {
    /// Cluster index per row, in `[0, nclusters)`.
    pub labels: Vec<usize>,
    /// `nclusters × dim` centres.
    pub centers: Array2<f64>,
    /// Sum of squared distances of rows to their centres.
    pub inertia: f64,
    /// Lloyd iterations of the winning run.
    pub iterations: usize,
}

/// Seeded Lloyd's k-means.
#[derive(Debug, Clone)]
pub struct KMeans {
    nclusters: usize,
    config: KMeansConfig,
}

impl KMeans {
    /// k-means with `nclusters` centres.
    #[must_use]
    pub fn new(nclusters: usize, config: KMeansConfig) -> Self {
        Self { nclusters, config }
    }

    /// Cluster the rows of `data`. All randomness is drawn from `rng`.
    ///
    /// # Errors
    ///
    /// [`QpxError::EmptyInput`] for a matrix without rows and
    /// [`DimensionError::OutOfRange`](qpx_core::DimensionError::OutOfRange)
    /// when `nclusters ∉ [1, rows]`.
    pub fn fit<R: Rng>(&self, data: ArrayView2<'_, f64>, rng: &mut R) -> QpxResult<KMeansFit> {
        let n = data.nrows();
        if n == 0 {
            return Err(QpxError::EmptyInput);
        }
        if self.nclusters < 1 || self.nclusters > n {
            return Err(QpxError::out_of_range("nclusters", self.nclusters, 1, n));
        }

        let mut best: Option<KMeansFit> = None;
        for run in 0..self.config.n_init.max(1) {
            let fit = self.fit_once(data, rng);
            trace!(run, inertia = fit.inertia, iterations = fit.iterations, "k-means run");
            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }
        let best = best.ok_or(QpxError::EmptyInput)?;
        debug!(inertia = best.inertia, iterations = best.iterations, "k-means fitted");
        Ok(best)
    }

    fn fit_once<R: Rng>(&self, data: ArrayView2<'_, f64>, rng: &mut R) -> KMeansFit {
        let (n, dim) = data.dim();
        let k = self.nclusters;

        let mut centers = Array2::<f64>::zeros((k, dim));
        for (c, row) in self.initial_rows(data, rng).into_iter().enumerate() {
            centers.row_mut(c).assign(&data.row(row));
        }

        let mut labels: Vec<usize> = Vec::new();
        let mut iterations = 0;
        for iter in 0..self.config.max_iter {
            let assigned: Vec<usize> = (0..n)
                .into_par_iter()
                .map(|i| nearest_center(data.row(i), centers.view()).0)
                .collect();
            if iter > 0 && assigned == labels {
                break;
            }
            labels = assigned;
            iterations = iter + 1;

            let mut sums = Array2::<f64>::zeros((k, dim));
            let mut counts = vec![0usize; k];
            for (i, &c) in labels.iter().enumerate() {
                sums.row_mut(c).scaled_add(1.0, &data.row(i));
                counts[c] += 1;
            }
            for (c, &count) in counts.iter().enumerate() {
                if count > 0 {
                    let mean: Array1<f64> = &sums.row(c) / count as f64;
                    centers.row_mut(c).assign(&mean);
                }
            }
        }

        let inertia = labels
            .iter()
            .enumerate()
            .map(|(i, &c)| squared_distance(data.row(i), centers.row(c)))
            .sum();
        KMeansFit { labels, centers, inertia, iterations }
    }

    /// Row indices of the starting centres, all distinct.
    fn initial_rows<R: Rng>(&self, data: ArrayView2<'_, f64>, rng: &mut R) -> Vec<usize> {
        let n = data.nrows();
        let k = self.nclusters;
        match self.config.init {
            KMeansInit::Random => index::sample(rng, n, k).into_vec(),
            KMeansInit::PlusPlus => {
                let mut chosen = vec![rng.gen_range(0..n)];
                let mut nearest: Vec<f64> =
                    (0..n).map(|i| squared_distance(data.row(i), data.row(chosen[0]))).collect();
                while chosen.len() < k {
                    let next = match WeightedIndex::new(&nearest) {
                        Ok(dist) => dist.sample(rng),
                        // Every remaining row coincides with a centre.
                        Err(_) => {
                            let free: Vec<usize> = (0..n).filter(|i| !chosen.contains(i)).collect();
                            free[rng.gen_range(0..free.len())]
                        }
                    };
                    chosen.push(next);
                    for (i, slot) in nearest.iter_mut().enumerate() {
                        *slot = slot.min(squared_distance(data.row(i), data.row(next)));
                    }
                }
                chosen
            }
        }
    }
}

/// Index of and squared distance to the nearest row of `centers`. Ties go
/// to the lowest index.
#[must_use]
pub fn nearest_center(point: ArrayView1<'_, f64>, centers: ArrayView2<'_, f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, center) in centers.outer_iter().enumerate() {
        let d = squared_distance(point, center);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_groups() -> Array2<f64> {
        array![[0.0, 0.0], [0.1, 0.0], [0.0, 0.1], [5.0, 5.0], [5.1, 5.0], [5.0, 5.1]]
    }

    #[test]
    fn separates_two_groups() {
        let data = two_groups();
        let mut rng = StdRng::seed_from_u64(42);
        let fit = KMeans::new(2, KMeansConfig::default()).fit(data.view(), &mut rng).unwrap();

        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[0], fit.labels[2]);
        assert_eq!(fit.labels[3], fit.labels[4]);
        assert_eq!(fit.labels[3], fit.labels[5]);
        assert_ne!(fit.labels[0], fit.labels[3]);
        assert!(fit.inertia < 0.1);
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let data = two_groups();
        let km = KMeans::new(3, KMeansConfig { max_iter: 50, n_init: 3, ..KMeansConfig::default() });
        let a = km.fit(data.view(), &mut StdRng::seed_from_u64(7)).unwrap();
        let b = km.fit(data.view(), &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nearest_center_ties_go_to_lowest_index() {
        let centers = array![[1.0, 0.0], [-1.0, 0.0]];
        let (c, d) = nearest_center(array![0.0, 0.0].view(), centers.view());
        assert_eq!(c, 0);
        assert_eq!(d, 1.0);
    }

    #[test]
    fn empty_cluster_keeps_its_center() {
        // Identical rows: every row ties, so everything lands in cluster 0
        // and cluster 1 keeps its initial position.
        let data = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let fit = KMeans::new(2, KMeansConfig { max_iter: 10, n_init: 1, ..KMeansConfig::default() })
            .fit(data.view(), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(fit.labels.iter().all(|&l| l == 0));
        assert_eq!(fit.centers.row(1), array![1.0, 1.0].view());
        assert_eq!(fit.inertia, 0.0);
    }

    #[test]
    fn plus_plus_seeding_spreads_centres() {
        // Three tight, identical-valued groups: k-means++ never seeds two
        // centres in one group, so a single run recovers all three.
        let mut rows = Vec::new();
        for g in 0..3 {
            for _ in 0..5 {
                rows.extend_from_slice(&[g as f64 * 10.0, 0.0]);
            }
        }
        let data = Array2::from_shape_vec((15, 2), rows).unwrap();
        let config = KMeansConfig { n_init: 1, init: KMeansInit::PlusPlus, ..KMeansConfig::default() };
        for seed in 0..5 {
            let fit = KMeans::new(3, config.clone()).fit(data.view(), &mut StdRng::seed_from_u64(seed)).unwrap();
            assert_eq!(fit.inertia, 0.0);
        }
    }

    #[test]
    fn labels_in_range() {
        let data = Array2::from_shape_fn((20, 3), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let fit = KMeans::new(4, KMeansConfig::default()).fit(data.view(), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(fit.labels.len(), 20);
        assert!(fit.labels.iter().all(|&l| l < 4));
    }

    #[test]
    fn invalid_cluster_counts() {
        let data = two_groups();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(KMeans::new(0, KMeansConfig::default()).fit(data.view(), &mut rng).is_err());
        assert!(KMeans::new(7, KMeansConfig::default()).fit(data.view(), &mut rng).is_err());
        assert!(matches!(
            KMeans::new(1, KMeansConfig::default()).fit(Array2::<f64>::zeros((0, 2)).view(), &mut rng),
            Err(QpxError::EmptyInput)
        ));
    }
}
