//! Error kinds of the fetch path.
//!
//! The split follows the recovery policy: anything worth "one tile of
//! nodata" is recovered inside [`Level`](crate::Level) and never surfaces;
//! these variants are what the caller must handle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
	/// The addressed tile holds no data.
	#[error("no data found for the requested tile")]
	TileNotFound,

	/// The request addresses more tiles than the service allows.
	#[error("requested window spans {tiles_x}x{tiles_y} tiles, above the per-request cap of {max_x}x{max_y}")]
	TooManyTiles {
		tiles_x: u32,
		tiles_y: u32,
		max_x: u32,
		max_y: u32,
	},

	/// The requested extent does not intersect the level at all.
	#[error("requested extent does not intersect the level")]
	EmptyWindow,

	/// The requested extent has no image in the source CRS.
	#[error("requested extent cannot be mapped into the source CRS")]
	OutsideProjection(#[source] anyhow::Error),

	/// Corrupt slabs, unknown codecs, symbolic loops.
	#[error(transparent)]
	Fatal(#[from] anyhow::Error),
}
