//! Tile pyramid primitives: quad tile identifiers, the pyramid plane and per-tile bounds.

mod coord_system;
mod tile_id;

pub use coord_system::{CoordSystem, Mbr};
pub use tile_id::TileId;
