//! Sparse iterative eigensolver for the smallest Laplacian eigenpairs.
//!
//! Block subspace iteration on the shifted operator `B = 2I − L`. `B` is
//! similar to `I + D^{-1} W`, whose spectrum lies in the disk of radius 1
//! around 1, so the smallest eigenvalues `μ` of `L` are the dominant
//! eigenvalues `θ = 2 − μ` of `B`. Only block products with the sparse
//! operator are needed; the dense work is confined to a `p × p` projected
//! problem with `p = nev + oversample`.
//!
//! Every `check_interval` iterations a Rayleigh–Ritz step projects `B` onto
//! the current block, solves the small problem with `nalgebra` (real Schur
//! form, retried on a perturbed copy when it stalls, real parts of the
//! eigenvalues as shifts, Ritz vectors by shifted inverse iteration,
//! Rayleigh quotients as Ritz values) and measures `‖B x − θ x‖` for every
//! wanted pair. A repeated eigenvalue, e.g. `μ = 0` of a graph with several
//! components, keeps its full multiplicity because the block carries all of
//! its directions at once.
//!
//! When `p` reaches `N` the block is the identity and one exact projection
//! replaces the iteration.

use nalgebra::{DMatrix, DVector, Schur, SymmetricEigen};
use ndarray::Array2;
use qpx_core::{QpxError, QpxResult};
use rand::Rng;
use std::cmp::Ordering;
use tracing::{debug, instrument, warn};

use crate::config::EigenSolverConfig;
use crate::laplacian::NormalizedLaplacian;

/// Sweeps allowed to the dense Schur decomposition per block column.
const SCHUR_SWEEPS_PER_COLUMN: usize = 1000;

/// Relative convergence threshold of the dense Schur decomposition.
const SCHUR_EPS: f64 = 1e-12;

/// Relative sizes of the random perturbations tried when the Schur
/// decomposition of the projected operator stalls.
const PERTURBATIONS: [f64; 3] = [1e-12, 1e-10, 1e-8];

/// Relative distance under which two Ritz values share an eigenspace.
const CLUSTER_TOLERANCE: f64 = 1e-6;

/// Inverse-iteration steps per Ritz vector.
const INVERSE_ITERATION_STEPS: usize = 4;

/// Attempts to refill a collapsed block column before giving up.
const MAX_REFILLS: usize = 8;

// ---------------------------------------------------------------------------
// EigenDecomposition
// ---------------------------------------------------------------------------

/// Smallest eigenpairs of a normalized Laplacian.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues of `L`, ascending.
    pub eigenvalues: Vec<f64>,
    /// `N × nev` eigenvectors, column `c` belongs to `eigenvalues[c]`.
    pub eigenvectors: Array2<f64>,
    /// Block iterations performed.
    pub iterations: usize,
    /// Whether every residual reached the tolerance.
    pub converged: bool,
    /// Largest residual `‖B x − θ x‖` among the returned pairs.
    pub max_residual: f64,
}

// ---------------------------------------------------------------------------
// SubspaceEigensolver
// ---------------------------------------------------------------------------

/// Block subspace-iteration eigensolver.
#[derive(Debug, Clone, Default)]
pub struct SubspaceEigensolver {
    config: EigenSolverConfig,
}

impl SubspaceEigensolver {
    /// Solver with the given settings.
    #[must_use]
    pub fn new(config: EigenSolverConfig) -> Self {
        Self { config }
    }

    /// Solver settings.
    #[must_use]
    pub fn config(&self) -> &EigenSolverConfig {
        &self.config
    }

    /// The `nev` smallest eigenvalues of `laplacian` and their eigenvectors.
    ///
    /// Non-convergence within `max_iter` is reported through
    /// [`EigenDecomposition::converged`] and a warning, not as an error.
    ///
    /// # Errors
    ///
    /// [`DimensionError::OutOfRange`](qpx_core::DimensionError::OutOfRange)
    /// for `nev ∉ [1, N]`, [`QpxError::NumericalDegeneracy`] when no Ritz
    /// vector can be extracted or the block collapses.
    #[instrument(skip_all, fields(n = laplacian.len(), nev))]
    pub fn smallest<R: Rng>(
        &self,
        laplacian: &NormalizedLaplacian,
        nev: usize,
        rng: &mut R,
    ) -> QpxResult<EigenDecomposition> {
        let n = laplacian.len();
        if nev < 1 || nev > n {
            return Err(QpxError::out_of_range("nev", nev, 1, n));
        }
        let p = n.min(nev + self.config.oversample);

        if p == n {
            let q = Array2::<f64>::eye(n);
            let ritz = rayleigh_ritz(laplacian, &q, nev, rng)?;
            debug!(max_residual = ritz.max_residual, "exact projection");
            return Ok(ritz.into_decomposition(1, self.config.tol));
        }

        let mut q = Array2::<f64>::from_shape_fn((n, p), |_| rng.gen_range(-1.0..1.0));
        orthonormalize(&mut q, rng)?;

        let mut last: Option<Ritz> = None;
        let mut iterations = 0;
        for iter in 1..=self.config.max_iter {
            iterations = iter;
            q = laplacian.apply_shifted(&q);
            orthonormalize(&mut q, rng)?;

            if iter % self.config.check_interval != 0 && iter != self.config.max_iter {
                continue;
            }
            let ritz = rayleigh_ritz(laplacian, &q, nev, rng)?;
            let done = ritz.max_residual <= self.config.tol;
            last = Some(ritz);
            if done {
                break;
            }
        }

        let ritz = match last {
            Some(ritz) => ritz,
            None => rayleigh_ritz(laplacian, &q, nev, rng)?,
        };
        let decomposition = ritz.into_decomposition(iterations, self.config.tol);
        if decomposition.converged {
            debug!(iterations, max_residual = decomposition.max_residual, "eigensolver converged");
        } else {
            warn!(
                iterations,
                max_residual = decomposition.max_residual,
                tol = self.config.tol,
                "eigensolver did not converge; using the last Ritz approximation"
            );
        }
        Ok(decomposition)
    }
}

// ---------------------------------------------------------------------------
// Rayleigh–Ritz
// ---------------------------------------------------------------------------

/// Ritz approximation of the wanted eigenpairs of `B`.
struct Ritz {
    /// Ritz values of `B`, descending.
    theta: Vec<f64>,
    vectors: Array2<f64>,
    max_residual: f64,
}

impl Ritz {
    fn into_decomposition(self, iterations: usize, tol: f64) -> EigenDecomposition {
        EigenDecomposition {
            eigenvalues: self.theta.iter().map(|t| 2.0 - t).collect(),
            eigenvectors: self.vectors,
            iterations,
            converged: self.max_residual <= tol,
            max_residual: self.max_residual,
        }
    }
}

fn rayleigh_ritz<R: Rng>(
    laplacian: &NormalizedLaplacian,
    q: &Array2<f64>,
    nev: usize,
    rng: &mut R,
) -> QpxResult<Ritz> {
    let p = q.ncols();
    let bq = laplacian.apply_shifted(q);
    let projected = q.t().dot(&bq);
    let h = DMatrix::from_fn(p, p, |r, c| projected[[r, c]]);

    let spectrum = projected_spectrum(&h, rng);
    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&a, &b| descending(spectrum[a], spectrum[b]).then(a.cmp(&b)));
    let shifts: Vec<f64> = order.iter().take(nev).map(|&i| spectrum[i]).collect();

    let mut pairs: Vec<(f64, DVector<f64>)> = Vec::with_capacity(nev);
    for &shift in &shifts {
        let cluster = same_eigenspace(&pairs, shift);
        let mut v = ritz_vector(&h, shift, &cluster, rng)?;
        // Rayleigh quotient on the unperturbed `h`.
        let mut theta = v.dot(&(&h * &v));
        let refined = same_eigenspace(&pairs, theta);
        if refined.len() > cluster.len() {
            v = ritz_vector(&h, theta, &refined, rng)?;
            theta = v.dot(&(&h * &v));
        }
        pairs.push((theta, v));
    }
    pairs.sort_by(|a, b| descending(a.0, b.0));

    let theta: Vec<f64> = pairs.iter().map(|(t, _)| *t).collect();
    let y_block = Array2::from_shape_fn((p, nev), |(r, c)| pairs[c].1[r]);
    let vectors = q.dot(&y_block);
    let b_vectors = bq.dot(&y_block);
    let max_residual = (0..nev)
        .map(|c| {
            let residual = &b_vectors.column(c) - &(&vectors.column(c) * theta[c]);
            residual.dot(&residual).sqrt()
        })
        .fold(0.0, f64::max);

    Ok(Ritz { theta, vectors, max_residual })
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// Vectors of the pairs whose Ritz value is numerically equal to `theta`.
fn same_eigenspace(pairs: &[(f64, DVector<f64>)], theta: f64) -> Vec<&DVector<f64>> {
    pairs
        .iter()
        .filter(|(other, _)| (other - theta).abs() <= CLUSTER_TOLERANCE * theta.abs().max(1.0))
        .map(|(_, v)| v)
        .collect()
}

/// Real parts of the eigenvalues of the projected operator.
///
/// Repeated eigenvalues of a non-symmetric `h` (one per graph component at
/// `θ = 2`) can stall the Francis iteration, so a failed Schur decomposition
/// is retried on `h` plus a random perturbation of growing size. If every
/// attempt fails the eigenvalues of the symmetric part `(h + hᵀ) / 2` serve
/// as shifts; the Rayleigh quotients of the resulting Ritz vectors on `h`
/// stay exact either way.
fn projected_spectrum<R: Rng>(h: &DMatrix<f64>, rng: &mut R) -> Vec<f64> {
    let p = h.nrows();
    let scale = h.norm().max(1.0);
    let max_sweeps = SCHUR_SWEEPS_PER_COLUMN * p;

    if let Some(schur) = Schur::try_new(h.clone(), SCHUR_EPS, max_sweeps) {
        return schur.complex_eigenvalues().iter().map(|z| z.re).collect();
    }
    for (attempt, &magnitude) in PERTURBATIONS.iter().enumerate() {
        let noise = DMatrix::<f64>::from_fn(p, p, |_, _| rng.gen_range(-1.0..1.0) * magnitude * scale);
        if let Some(schur) = Schur::try_new(h + noise, SCHUR_EPS, max_sweeps) {
            debug!(attempt = attempt + 1, magnitude, "Schur decomposition converged after perturbation");
            return schur.complex_eigenvalues().iter().map(|z| z.re).collect();
        }
    }

    warn!(p, "Schur decomposition failed; using the symmetric part of the projected operator");
    let symmetric = (h + h.transpose()) * 0.5;
    SymmetricEigen::new(symmetric).eigenvalues.iter().copied().collect()
}

/// Eigenvector of `h` for the real eigenvalue `theta` by shifted inverse
/// iteration, kept orthogonal to `cluster` (vectors of numerically equal
/// eigenvalues already extracted).
fn ritz_vector<R: Rng>(
    h: &DMatrix<f64>,
    theta: f64,
    cluster: &[&DVector<f64>],
    rng: &mut R,
) -> QpxResult<DVector<f64>> {
    let p = h.nrows();
    let mut delta = 1e-10 * theta.abs().max(1.0);

    for _ in 0..MAX_REFILLS {
        let lu = (h - DMatrix::<f64>::identity(p, p) * (theta + delta)).lu();
        let mut v = DVector::<f64>::from_fn(p, |_, _| rng.gen_range(-1.0..1.0));
        let mut solved = true;

        for _ in 0..INVERSE_ITERATION_STEPS {
            v = match lu.solve(&v) {
                Some(next) => next,
                None => {
                    solved = false;
                    break;
                }
            };
            for u in cluster {
                let overlap = u.dot(&v);
                v -= *u * overlap;
            }
            let norm = v.norm();
            if !norm.is_finite() || norm == 0.0 {
                solved = false;
                break;
            }
            v /= norm;
        }

        if solved {
            return Ok(v);
        }
        delta *= 1e3;
    }
    Err(QpxError::degenerate(format!("no Ritz vector found for eigenvalue {:.6e}", 2.0 - theta)))
}

// ---------------------------------------------------------------------------
// Orthonormalization
// ---------------------------------------------------------------------------

/// Modified Gram–Schmidt with a second pass. A column that collapses
/// against its predecessors is replaced with a fresh random direction.
fn orthonormalize<R: Rng>(q: &mut Array2<f64>, rng: &mut R) -> QpxResult<()> {
    let (n, p) = q.dim();
    for j in 0..p {
        let mut attempts = 0;
        loop {
            let initial = q.column(j).dot(&q.column(j)).sqrt();
            for _pass in 0..2 {
                for i in 0..j {
                    let qi = q.column(i).to_owned();
                    let r = qi.dot(&q.column(j));
                    q.column_mut(j).scaled_add(-r, &qi);
                }
            }
            let norm = q.column(j).dot(&q.column(j)).sqrt();
            if norm.is_finite() && norm > 1e-10 * initial && norm > 0.0 {
                q.column_mut(j).mapv_inplace(|v| v / norm);
                break;
            }
            attempts += 1;
            if attempts > MAX_REFILLS {
                return Err(QpxError::degenerate(format!("block column {j} of {p} collapsed in dimension {n}")));
            }
            for v in q.column_mut(j).iter_mut() {
                *v = rng.gen_range(-1.0..1.0);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AffinityGraph, KnnGraphBuilder};
    use crate::matrix::DistanceMatrix;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Points on a line, grouped in runs of `size` separated by wide gaps.
    fn grouped_line(groups: usize, size: usize, k: usize) -> AffinityGraph {
        let positions: Vec<f64> =
            (0..groups * size).map(|i| (i / size) as f64 * 1000.0 + (i % size) as f64).collect();
        let n = positions.len();
        let d = Array2::from_shape_fn((n, n), |(i, j)| (positions[i] - positions[j]).abs());
        KnnGraphBuilder::new(k).build(&DistanceMatrix::from_array(d).unwrap()).unwrap()
    }

    fn dense_spectrum(lap: &NormalizedLaplacian) -> Vec<f64> {
        let l = lap.to_dense();
        let n = l.nrows();
        let m = DMatrix::from_fn(n, n, |r, c| l[[r, c]]);
        let mut values: Vec<f64> = SymmetricEigen::new(m).eigenvalues.iter().copied().collect();
        values.sort_by(f64::total_cmp);
        values
    }

    #[test]
    fn matches_dense_solver_on_symmetric_graph() {
        let graph = grouped_line(1, 40, 4).symmetrized();
        let lap = NormalizedLaplacian::new(&graph, 1e-12);
        let mut rng = StdRng::seed_from_u64(3);
        let eig = SubspaceEigensolver::default().smallest(&lap, 4, &mut rng).unwrap();

        assert!(eig.converged);
        let reference = dense_spectrum(&lap);
        for (got, want) in eig.eigenvalues.iter().zip(&reference) {
            assert_relative_eq!(got, want, epsilon = 1e-6);
        }
    }

    #[test]
    fn recovers_multiplicity_of_zero_for_disconnected_graph() {
        let graph = grouped_line(3, 15, 4);
        assert_eq!(graph.connected_components(), 3);
        let lap = NormalizedLaplacian::new(&graph, 1e-12);
        let mut rng = StdRng::seed_from_u64(11);
        let eig = SubspaceEigensolver::default().smallest(&lap, 4, &mut rng).unwrap();

        assert_eq!(eig.eigenvalues.len(), 4);
        for &mu in &eig.eigenvalues[..3] {
            assert_relative_eq!(mu, 0.0, epsilon = 1e-6);
        }
        assert!(eig.eigenvalues[3] > 1e-3);
        assert_eq!(eig.eigenvectors.dim(), (45, 4));
    }

    #[test]
    fn disconnected_directed_graph_solves_for_every_seed() {
        let graph = grouped_line(3, 20, 6);
        assert!(!graph.is_symmetric());
        let lap = NormalizedLaplacian::new(&graph, 1e-12);
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let eig = SubspaceEigensolver::default().smallest(&lap, 4, &mut rng).unwrap();
            assert!(eig.converged, "seed {seed}: residual {}", eig.max_residual);
            for &mu in &eig.eigenvalues[..3] {
                assert_relative_eq!(mu, 0.0, epsilon = 1e-6);
            }
            let gram = eig.eigenvectors.t().dot(&eig.eigenvectors);
            for c in 0..3 {
                assert_relative_eq!(gram[[c, c]], 1.0, epsilon = 1e-8);
            }
            assert_relative_eq!(gram[[0, 1]], 0.0, epsilon = 1e-6);
            assert_relative_eq!(gram[[1, 2]], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn projected_spectrum_keeps_repeated_eigenvalue() {
        let h = DMatrix::from_row_slice(
            5,
            5,
            &[
                2.0, 0.0, 0.0, 0.3, 0.1, //
                0.0, 2.0, 0.0, 0.2, 0.4, //
                0.0, 0.0, 2.0, 0.5, 0.2, //
                0.0, 0.0, 0.0, 1.2, 0.3, //
                0.0, 0.0, 0.0, 0.0, 0.7,
            ],
        );
        let mut rng = StdRng::seed_from_u64(0);
        let mut spectrum = projected_spectrum(&h, &mut rng);
        spectrum.sort_by(|a, b| descending(*a, *b));
        for (got, want) in spectrum.iter().zip([2.0, 2.0, 2.0, 1.2, 0.7]) {
            assert_relative_eq!(*got, want, epsilon = 1e-6);
        }
    }

    #[test]
    fn same_eigenspace_uses_relative_tolerance() {
        let v = DVector::from_vec(vec![1.0, 0.0]);
        let pairs = vec![(2.0, v.clone()), (1.5, v)];
        assert_eq!(same_eigenspace(&pairs, 2.0 + 1e-9).len(), 1);
        assert!(same_eigenspace(&pairs, 1.9).is_empty());
    }

    #[test]
    fn eigenvalues_sorted_and_bounded() {
        let graph = grouped_line(2, 20, 3);
        let lap = NormalizedLaplacian::new(&graph, 1e-12);
        let mut rng = StdRng::seed_from_u64(5);
        let eig = SubspaceEigensolver::default().smallest(&lap, 6, &mut rng).unwrap();

        for w in eig.eigenvalues.windows(2) {
            assert!(w[0] <= w[1]);
        }
        for &mu in &eig.eigenvalues {
            assert!((-1e-8..=2.0 + 1e-8).contains(&mu));
        }
    }

    #[test]
    fn small_problem_uses_exact_projection() {
        let graph = grouped_line(1, 5, 3);
        let lap = NormalizedLaplacian::new(&graph, 1e-12);
        let mut rng = StdRng::seed_from_u64(1);
        let eig = SubspaceEigensolver::default().smallest(&lap, 4, &mut rng).unwrap();
        assert_eq!(eig.iterations, 1);
        assert_relative_eq!(eig.eigenvalues[0], 0.0, epsilon = 1e-8);
    }

    #[test]
    fn ritz_vectors_are_orthonormal() {
        let graph = grouped_line(2, 20, 3);
        let lap = NormalizedLaplacian::new(&graph, 1e-12);
        let mut rng = StdRng::seed_from_u64(9);
        let eig = SubspaceEigensolver::default().smallest(&lap, 3, &mut rng).unwrap();
        let gram = eig.eigenvectors.t().dot(&eig.eigenvectors);
        assert_relative_eq!(gram[[0, 0]], 1.0, epsilon = 1e-8);
        assert_relative_eq!(gram[[0, 1]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn nev_out_of_range_is_rejected() {
        let lap = NormalizedLaplacian::new(&grouped_line(1, 5, 2), 1e-12);
        let mut rng = StdRng::seed_from_u64(0);
        let solver = SubspaceEigensolver::default();
        assert!(solver.smallest(&lap, 0, &mut rng).is_err());
        assert!(solver.smallest(&lap, 6, &mut rng).is_err());
    }
}
