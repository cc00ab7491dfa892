//! Lazy raster images of the slabtiles engine: the scanline-pull [`Image`]
//! trait, the operator images that compose into a render graph, and the
//! interpolation kernels driving resampling and reprojection.

pub mod compound;
pub mod convert;
pub mod decimated;
pub mod empty;
pub mod extended_compound;
pub mod grid;
pub mod image;
pub mod kernel;
pub mod mirror;
pub mod raw;
pub mod reprojected;
pub mod resampled;

pub use compound::CompoundImage;
pub use decimated::DecimatedImage;
pub use empty::EmptyImage;
pub use extended_compound::ExtendedCompoundImage;
pub use grid::Grid;
pub use image::{BoxImage, Image, RasterGeometry};
pub use kernel::{Kernel, KernelType};
pub use mirror::{MirrorImage, MirrorSide};
pub use raw::RawImage;
pub use reprojected::ReprojectedImage;
pub use resampled::ResampledImage;
