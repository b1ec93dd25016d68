//! # QPX Core
//!
//! Core types, schema registry, error hierarchy and collaborator contracts
//! for classifying quasi-particle excitations from spectroscopic data.
//!
//! This crate provides the foundational building blocks used by
//! `qpx-classify` and `qpx-cli`:
//!
//! - **Data Types**: [`FeatureBundle`], [`InvariantValue`], [`IntensityData`],
//!   [`ModelHypothesis`], [`QuerySpec`] and [`FeatureSpec`].
//! - **Schema**: [`InvariantRegistry`], the explicit name → kind table used
//!   to validate feature batches and metrics.
//! - **Error Types**: [`QpxError`] and its nested error enums in [`error`].
//! - **Traits**: [`FeatureExtractor`] and [`Simulator`], the contracts of
//!   the external extraction and simulation collaborators.
//!
//! ## Example
//!
//! ```rust
//! use qpx_core::{FeatureBundle, InvariantKind, InvariantRegistry};
//!
//! let schema = InvariantRegistry::standard();
//! let bundle = FeatureBundle::new("sample-0")
//!     .with_static("persistence_entropy", 1.2)
//!     .with_static("betti_curve", vec![4.0, 2.0, 1.0, 0.0]);
//!
//! for (key, value) in bundle.static_group() {
//!     assert_eq!(schema.kind_of(key), Some(value.kind()));
//! }
//! # let _ = InvariantKind::Scalar;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use error::{ConfigError, DimensionError, QpxError, QpxResult};
pub use registry::InvariantRegistry;
pub use traits::{FeatureExtractor, Simulator};
pub use types::{
    AxisCoordinates, AxisGrid, FeatureBundle, FeatureSpec, IntensityData, InvariantGroup,
    InvariantKind, InvariantValue, ModelHypothesis, Provenance, QuerySpec,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{QpxError, QpxResult};
    pub use crate::registry::InvariantRegistry;
    pub use crate::traits::{FeatureExtractor, Simulator};
    pub use crate::types::{
        FeatureBundle, FeatureSpec, IntensityData, InvariantKind, InvariantValue, ModelHypothesis,
        QuerySpec,
    };
}
