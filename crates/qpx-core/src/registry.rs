//! Invariant schema registry.
//!
//! Maps every invariant name to its [`InvariantKind`]. The registry is an
//! explicit value handed to validation, never a process-wide table, so a
//! test suite can substitute its own schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{read_json, ConfigError};
use crate::types::InvariantKind;

/// Scalar invariants in the standard schema.
pub const STANDARD_SCALAR_INVARIANTS: [&str; 6] = [
    "persistence_entropy",
    "total_persistence",
    "max_persistence",
    "betti_number_0",
    "betti_number_1",
    "spectral_weight",
];

/// Vector invariants in the standard schema.
pub const STANDARD_VECTOR_INVARIANTS: [&str; 5] = [
    "betti_curve",
    "persistence_landscape",
    "persistence_image",
    "persistence_silhouette",
    "spectral_profile",
];

/// Mapping from invariant name to kind.
///
/// ```rust
/// use qpx_core::{InvariantKind, InvariantRegistry};
///
/// let schema = InvariantRegistry::new()
///     .with("gap_energy", InvariantKind::Scalar)
///     .with("dispersion", InvariantKind::Vector);
///
/// assert_eq!(schema.kind_of("dispersion"), Some(InvariantKind::Vector));
/// assert!(schema.kind_of("betti_curve").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvariantRegistry {
    entries: BTreeMap<String, InvariantKind>,
}

impl InvariantRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard topological/spectral invariant table.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for name in STANDARD_SCALAR_INVARIANTS {
            registry.register(name, InvariantKind::Scalar);
        }
        for name in STANDARD_VECTOR_INVARIANTS {
            registry.register(name, InvariantKind::Vector);
        }
        registry
    }

    /// Load a registry from a JSON object of `name -> "scalar" | "vector"`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        read_json(path)
    }

    /// Register `name`, returning the previous kind if it was already known.
    pub fn register(&mut self, name: impl Into<String>, kind: InvariantKind) -> Option<InvariantKind> {
        self.entries.insert(name.into(), kind)
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, kind: InvariantKind) -> Self {
        self.register(name, kind);
        self
    }

    /// Kind of a registered invariant.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<InvariantKind> {
        self.entries.get(name).copied()
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered invariants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered invariants in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, InvariantKind)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
