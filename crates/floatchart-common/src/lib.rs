//! floatchart-common: Shared types, errors, and schema used across all FloatChart crates.

pub mod error;
pub mod observation;
pub mod geo;

// Re-export commonly used types
pub use error::{FloatChartError, Result};
pub use geo::{BoundingBox, GeoExtent, GeoPoint, GeoRegion, RegionKind};
pub use observation::{Observation, Variable, OBSERVATIONS_TABLE};
