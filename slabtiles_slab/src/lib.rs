//! Slab storage format of the slabtiles engine: the TIFF-shaped header, the
//! tile index, symbolic-slab resolution, per-tile codecs and the slab
//! reader/writer.

pub mod codec;
pub mod slab;
mod tiff_envelope;

pub use slab::{SLAB_HEADER_SIZE, SLAB_LINK_SIGNATURE, SlabHeader, SlabReader, SlabWriter, TileIndex};
pub use tiff_envelope::tiff_envelope;
