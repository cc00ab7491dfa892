//! Core primitives of the slabtiles engine: byte buffers and ranges,
//! terrain bounding boxes, coordinate reference systems, pixel formats,
//! tile matrix descriptors and the pluggable storage contexts.

pub mod storage;
pub mod types;

pub use types::{
	Blob, BoundingBox, ByteRange, Compression, Crs, Photometric, PixelFormat, SampleFormat, TileMatrix, TileMatrixSet,
};
