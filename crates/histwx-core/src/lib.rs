//! Core data types, normalization and rollup calculations for histwx
//!
//! Everything here is storage- and transport-agnostic: the API record
//! shapes, the normalized observation rows written to the two tables,
//! null-aware daily rollups, and the `WeatherStore` seam the merge layer
//! writes through.

pub mod normalize;
pub mod pipeline;
pub mod rollups;
pub mod types;

pub use normalize::*;
pub use pipeline::*;
pub use rollups::*;
pub use types::*;
