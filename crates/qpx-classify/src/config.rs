//! Classifier configuration.
//!
//! [`ClassifierConfig`] holds every tunable of a classification run: the
//! neighbourhood size, the cluster count, the optional Gaussian bandwidth,
//! the random seed and the settings of the eigensolver and of k-means. It is
//! serializable via [`serde`] so a run can be reproduced from a JSON file.
//!
//! # Example
//!
//! ```rust
//! use qpx_classify::config::ClassifierConfig;
//!
//! let cfg = ClassifierConfig::default();
//! cfg.validate().expect("default config is valid");
//!
//! assert_eq!(cfg.k, 10);
//! assert_eq!(cfg.nclusters, 3);
//! ```

use qpx_core::error::{read_json, write_json, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ClassifierConfig
// ---------------------------------------------------------------------------

/// Complete configuration of a classification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Neighbours per sample in the affinity graph and in the entropy
    /// estimate. Must satisfy `1 <= k <= N - 2` for the batch. Default: **10**.
    pub k: usize,

    /// Number of clusters. Default: **3**.
    pub nclusters: usize,

    /// Gaussian kernel bandwidth. `None` gives binary edge weights.
    /// Default: **None**.
    pub sigma: Option<f64>,

    /// Seed for eigensolver start vectors and k-means initialisation.
    /// `None` draws from OS entropy. Default: **Some(42)**.
    pub seed: Option<u64>,

    /// Added to node degrees before `d^{-1/2}`. Default: **1e-12**.
    pub degree_epsilon: f64,

    /// Added to row norms before embedding row-normalisation. Default: **1e-12**.
    pub embedding_epsilon: f64,

    /// Sparse eigensolver settings.
    pub eigen: EigenSolverConfig,

    /// k-means settings.
    pub kmeans: KMeansConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            k: 10,
            nclusters: 3,
            sigma: None,
            seed: Some(42),
            degree_epsilon: 1e-12,
            embedding_epsilon: 1e-12,
            eigen: EigenSolverConfig::default(),
            kmeans: KMeansConfig::default(),
        }
    }
}

impl ClassifierConfig {
    /// Default configuration with the given neighbour and cluster counts.
    #[must_use]
    pub fn with_counts(k: usize, nclusters: usize) -> Self {
        Self { k, nclusters, ..Self::default() }
    }

    /// Load a [`ClassifierConfig`] from a JSON file and validate it.
    ///
    /// Missing fields take their default value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] / [`ConfigError::Parse`] for I/O and
    /// JSON problems and [`ConfigError::InvalidValue`] when validation fails.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let cfg: ClassifierConfig = read_json(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be written.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        write_json(self, path)
    }

    /// Validate all fields and return the first problem found.
    ///
    /// The relation between `k`, `nclusters` and the batch size is checked
    /// per call, since the batch is not known here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::invalid_value("k", "must be > 0"));
        }
        if self.nclusters == 0 {
            return Err(ConfigError::invalid_value("nclusters", "must be > 0"));
        }
        if let Some(sigma) = self.sigma {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(ConfigError::invalid_value("sigma", "must be finite and > 0.0"));
            }
        }
        if !self.degree_epsilon.is_finite() || self.degree_epsilon < 0.0 {
            return Err(ConfigError::invalid_value("degree_epsilon", "must be finite and >= 0.0"));
        }
        if !self.embedding_epsilon.is_finite() || self.embedding_epsilon < 0.0 {
            return Err(ConfigError::invalid_value("embedding_epsilon", "must be finite and >= 0.0"));
        }
        self.eigen.validate()?;
        self.kmeans.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EigenSolverConfig
// ---------------------------------------------------------------------------

/// Settings of the block subspace-iteration eigensolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EigenSolverConfig {
    /// Maximum block iterations. Default: **1000**.
    pub max_iter: usize,

    /// Residual tolerance `‖Bx − θx‖` for every wanted Ritz pair. Default: **1e-8**.
    pub tol: f64,

    /// Extra block columns beyond the wanted eigenpairs. Default: **10**.
    pub oversample: usize,

    /// Rayleigh–Ritz extraction every this many iterations. Default: **5**.
    pub check_interval: usize,
}

impl Default for EigenSolverConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-8, oversample: 10, check_interval: 5 }
    }
}

impl EigenSolverConfig {
    /// Validate the solver settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iter == 0 {
            return Err(ConfigError::invalid_value("eigen.max_iter", "must be > 0"));
        }
        if !self.tol.is_finite() || self.tol <= 0.0 {
            return Err(ConfigError::invalid_value("eigen.tol", "must be finite and > 0.0"));
        }
        if self.check_interval == 0 {
            return Err(ConfigError::invalid_value("eigen.check_interval", "must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KMeansConfig
// ---------------------------------------------------------------------------

/// How k-means picks its starting centres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KMeansInit {
    /// Distinct rows sampled uniformly.
    #[default]
    #[serde(rename = "random")]
    Random,
    /// k-means++: each further row drawn with probability proportional to
    /// its squared distance from the nearest centre chosen so far.
    #[serde(rename = "k-means++")]
    PlusPlus,
}

/// Settings of Lloyd's k-means on the spectral embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    /// Lloyd iterations per run. Default: **300**.
    pub max_iter: usize,

    /// Independent initialisations; the lowest-inertia run wins.
    /// Default: **32**.
    pub n_init: usize,

    /// Starting-centre strategy. Default: **random**.
    pub init: KMeansInit,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self { max_iter: 300, n_init: 32, init: KMeansInit::Random }
    }
}

impl KMeansConfig {
    /// Validate the k-means settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iter == 0 {
            return Err(ConfigError::invalid_value("kmeans.max_iter", "must be > 0"));
        }
        if self.n_init == 0 {
            return Err(ConfigError::invalid_value("kmeans.n_init", "must be > 0"));
        }
        Ok(())
    }
}
