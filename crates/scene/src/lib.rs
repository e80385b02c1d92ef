//! ROI state: the store of drawn polygons, the edits applied to it, and the
//! session that runs detection for each edit.

pub mod edit;
pub mod roi;
pub mod session;

pub use edit::*;
pub use roi::*;
pub use session::*;
