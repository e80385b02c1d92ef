pub mod analysis;
pub mod config;
pub mod detection;
pub mod filtering;

pub use config::*;
pub use detection::*;
pub use filtering::*;
