pub mod cell_masks;
pub mod layer_config;
pub mod roi_file;
pub mod tile;
pub mod tile_path;
pub mod tile_set;

pub use cell_masks::*;
pub use layer_config::*;
pub use roi_file::*;
pub use tile::*;
pub use tile_path::*;
pub use tile_set::*;
