mod blob;
mod bounding_box;
mod byte_range;
mod crs;
mod pixel_format;
mod tile_matrix;
mod tile_matrix_set;

pub use blob::Blob;
pub use bounding_box::BoundingBox;
pub use byte_range::ByteRange;
pub use crs::Crs;
pub use pixel_format::{Compression, Photometric, PixelFormat, SampleFormat};
pub use tile_matrix::TileMatrix;
pub use tile_matrix_set::TileMatrixSet;
