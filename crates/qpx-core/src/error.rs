//! Error types for the QPX classification system.
//!
//! This module is the single source of truth for every error the workspace
//! produces. Crates built on top of `qpx-core` return [`QpxResult`] and never
//! define their own top-level error enum.
//!
//! ## Hierarchy
//!
//! ```text
//! QpxError (top-level)
//! ├── EmptyInput              (no feature bundles supplied)
//! ├── SchemaInconsistency     (key sets / kinds / lengths differ across a batch)
//! ├── MetricIncompatibility   (metric references unknown keys or illegal distances)
//! ├── DimensionError          (length mismatch, parameter out of range)
//! ├── NumericalDegeneracy     (eigen-structure could not be resolved)
//! ├── ConfigError             (config validation / file loading)
//! ├── Extraction              (external feature extractor failed)
//! └── Simulation              (external simulator failed)
//! ```
//!
//! All validation errors are deterministic input failures. There is no retry
//! policy and the core never logs-and-swallows an error.

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// QpxResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used throughout the workspace.
pub type QpxResult<T> = Result<T, QpxError>;

// ---------------------------------------------------------------------------
// QpxError — top-level aggregator
// ---------------------------------------------------------------------------

/// Top-level error type for excitation classification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QpxError {
    /// No feature bundles were supplied.
    #[error("Empty input: no feature bundles supplied")]
    EmptyInput,

    /// Invariant key sets, kinds or vector lengths differ across the batch,
    /// or a bundle uses an invariant the schema does not know.
    #[error("Schema inconsistency in sample {sample}: {reason}")]
    SchemaInconsistency {
        /// Index of the first offending sample in the batch.
        sample: usize,
        /// Human-readable description of the mismatch.
        reason: String,
    },

    /// The metric references an unregistered invariant, an invariant absent
    /// from the bundles, or pairs a distance with the wrong invariant kind.
    #[error("Metric incompatibility for invariant `{invariant}`: {reason}")]
    MetricIncompatibility {
        /// Invariant key named by the metric.
        invariant: String,
        /// Human-readable description of the incompatibility.
        reason: String,
    },

    /// A shape or parameter-range error.
    #[error("Dimension error: {0}")]
    Dimension(#[from] DimensionError),

    /// Degenerate eigen-structure that could not be resolved.
    #[error("Numerical degeneracy: {reason}")]
    NumericalDegeneracy {
        /// Description of the degeneracy.
        reason: String,
    },

    /// A configuration validation or loading error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The external feature extractor failed.
    #[error("Feature extraction failed: {message}")]
    Extraction {
        /// Description supplied by the extractor.
        message: String,
    },

    /// The external forward simulator failed.
    #[error("Simulation failed: {message}")]
    Simulation {
        /// Description supplied by the simulator.
        message: String,
    },
}

impl QpxError {
    /// Construct a [`QpxError::SchemaInconsistency`].
    pub fn schema<S: Into<String>>(sample: usize, reason: S) -> Self {
        QpxError::SchemaInconsistency { sample, reason: reason.into() }
    }

    /// Construct a [`QpxError::MetricIncompatibility`].
    pub fn metric<K: Into<String>, S: Into<String>>(invariant: K, reason: S) -> Self {
        QpxError::MetricIncompatibility { invariant: invariant.into(), reason: reason.into() }
    }

    /// Construct a [`QpxError::NumericalDegeneracy`].
    pub fn degenerate<S: Into<String>>(reason: S) -> Self {
        QpxError::NumericalDegeneracy { reason: reason.into() }
    }

    /// Construct a [`QpxError::Extraction`].
    pub fn extraction<S: Into<String>>(message: S) -> Self {
        QpxError::Extraction { message: message.into() }
    }

    /// Construct a [`QpxError::Simulation`].
    pub fn simulation<S: Into<String>>(message: S) -> Self {
        QpxError::Simulation { message: message.into() }
    }

    /// Construct a [`DimensionError::LengthMismatch`] wrapped in a [`QpxError`].
    pub fn length_mismatch<K: Into<String>>(invariant: K, expected: usize, actual: usize) -> Self {
        DimensionError::LengthMismatch { invariant: invariant.into(), expected, actual }.into()
    }

    /// Construct a [`DimensionError::OutOfRange`] wrapped in a [`QpxError`].
    pub fn out_of_range(parameter: &'static str, value: usize, min: usize, max: usize) -> Self {
        DimensionError::OutOfRange { parameter, value, min, max }.into()
    }

    /// Returns `true` when the error was raised by input validation, i.e.
    /// before any numerical work started.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput
                | Self::SchemaInconsistency { .. }
                | Self::MetricIncompatibility { .. }
                | Self::Dimension(DimensionError::OutOfRange { .. })
                | Self::Config(_)
        )
    }
}

// ---------------------------------------------------------------------------
// DimensionError
// ---------------------------------------------------------------------------

/// Shape and parameter-range errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DimensionError {
    /// Two vector invariants that must be compared have different lengths.
    #[error("invariant `{invariant}` has length {actual}, expected {expected}")]
    LengthMismatch {
        /// Invariant key being compared.
        invariant: String,
        /// Length of the reference value.
        expected: usize,
        /// Length of the offending value.
        actual: usize,
    },

    /// A count parameter lies outside its valid range for the sample count.
    #[error("`{parameter}` = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Parameter name (`k`, `nclusters`, `samples`).
        parameter: &'static str,
        /// Supplied value.
        value: usize,
        /// Inclusive lower bound.
        min: usize,
        /// Inclusive upper bound.
        max: usize,
    },
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating configuration records.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read or written.
    #[error("Cannot access config file `{path}`: {source}")]
    FileRead {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    Parse {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Read and deserialize a JSON document from `path`.
///
/// # Errors
///
/// Returns [`ConfigError::FileRead`] when the file cannot be read and
/// [`ConfigError::Parse`] when the JSON does not match `T`.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })?;
    serde_json::from_str(&contents)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

/// Serialize `value` as pretty JSON and write it to `path`, creating parent
/// directories when necessary.
///
/// # Errors
///
/// Returns [`ConfigError::FileRead`] when the directory or file cannot be
/// written.
pub fn write_json<T: serde::Serialize>(value: &T, path: &std::path::Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|source| ConfigError::FileRead { path: parent.to_path_buf(), source })?;
        }
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
    std::fs::write(path, json).map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_error_converts_into_top_level() {
        let err: QpxError = DimensionError::OutOfRange { parameter: "k", value: 9, min: 1, max: 3 }.into();
        assert!(matches!(err, QpxError::Dimension(DimensionError::OutOfRange { value: 9, .. })));
        assert!(err.to_string().contains("`k` = 9"));
    }

    #[test]
    fn validation_classification() {
        assert!(QpxError::EmptyInput.is_validation());
        assert!(QpxError::schema(3, "missing key").is_validation());
        assert!(QpxError::metric("betti_curve", "bad kind").is_validation());
        assert!(QpxError::out_of_range("k", 0, 1, 3).is_validation());
        assert!(!QpxError::length_mismatch("betti_curve", 3, 4).is_validation());
        assert!(!QpxError::degenerate("no eigenvalues").is_validation());
    }

    #[test]
    fn read_json_reports_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.json");
        let err = read_json::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn read_json_reports_malformed_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_json::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn write_then_read_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("value.json");
        write_json(&vec![1.0_f64, 2.0], &path).unwrap();
        let back: Vec<f64> = read_json(&path).unwrap();
        assert_eq!(back, vec![1.0, 2.0]);
    }
}
