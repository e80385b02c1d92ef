//! Geometry kernel for region-of-interest detection.
//!
//! Pure functions over [`Ring`]s: no I/O, no shared state, inputs are never
//! mutated.

pub mod containment;
pub mod intersection;
pub mod ring;

pub use containment::*;
pub use intersection::*;
pub use ring::*;
