//! A tiled-raster pyramid engine: slab storage, tile decoding and windowed
//! rendering of georeferenced imagery.
//!
//! This facade crate re-exports the whole stack:
//! - [`slabtiles_core`]: byte primitives, pixel formats, tile matrices and
//!   the pluggable storage contexts;
//! - [`slabtiles_slab`]: the slab binary format, codecs, reader and writer;
//! - [`slabtiles_raster`]: the lazy image operators and interpolation
//!   kernels;
//! - [`slabtiles_pyramid`]: levels, pyramids and window fetches.

pub mod tools;

pub use {slabtiles_core, slabtiles_pyramid, slabtiles_raster, slabtiles_slab};
