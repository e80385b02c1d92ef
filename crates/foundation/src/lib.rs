pub mod bounds;
pub mod cancel;
pub mod ids;
pub mod precision;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use cancel::*;
pub use ids::*;
pub use precision::*;
