//! The slab storage unit: header, tile index, reader and writer.

pub mod header;
pub mod reader;
pub mod tile_index;
pub mod writer;

pub use header::{MAX_ENCODED_TILE_SIZE, SLAB_HEADER_SIZE, SLAB_LINK_SIGNATURE, SlabHeader};
pub use reader::SlabReader;
pub use tile_index::TileIndex;
pub use writer::SlabWriter;
