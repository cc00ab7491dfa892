//! This module provides the [`TileMatrix`] struct, the immutable geometry
//! descriptor of one pyramid level.

use anyhow::{Result, ensure};

/// Geometry of a single level: ground resolution, origin of the top-left
/// pixel, tile pixel dimensions and matrix dimensions in tiles.
///
/// All tiles of a level share the same resolution and are in phase with each
/// other by construction.
#[derive(Clone, Debug, PartialEq)]
pub struct TileMatrix {
	id: String,
	resolution: f64,
	x0: f64,
	y0: f64,
	tile_width: u32,
	tile_height: u32,
	matrix_width: u32,
	matrix_height: u32,
}

impl TileMatrix {
	pub fn new(
		id: &str,
		resolution: f64,
		x0: f64,
		y0: f64,
		tile_width: u32,
		tile_height: u32,
		matrix_width: u32,
		matrix_height: u32,
	) -> Result<TileMatrix> {
		ensure!(!id.is_empty(), "tile matrix identifier must not be empty");
		ensure!(resolution > 0.0, "tile matrix '{id}': resolution must be positive");
		ensure!(
			tile_width > 0 && tile_height > 0,
			"tile matrix '{id}': tile dimensions must be positive"
		);
		ensure!(
			matrix_width > 0 && matrix_height > 0,
			"tile matrix '{id}': matrix dimensions must be positive"
		);
		Ok(TileMatrix {
			id: id.to_owned(),
			resolution,
			x0,
			y0,
			tile_width,
			tile_height,
			matrix_width,
			matrix_height,
		})
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	/// Ground resolution, identical in X and Y.
	pub fn resolution(&self) -> f64 {
		self.resolution
	}

	/// X coordinate of the top-left pixel's corner.
	pub fn x0(&self) -> f64 {
		self.x0
	}

	/// Y coordinate of the top-left pixel's corner.
	pub fn y0(&self) -> f64 {
		self.y0
	}

	pub fn tile_width(&self) -> u32 {
		self.tile_width
	}

	pub fn tile_height(&self) -> u32 {
		self.tile_height
	}

	pub fn matrix_width(&self) -> u32 {
		self.matrix_width
	}

	pub fn matrix_height(&self) -> u32 {
		self.matrix_height
	}

	/// Phase of the level grid in X: `frac(x0 / resolution)`, in `[0,1)`.
	pub fn phase_x(&self) -> f64 {
		let phase = (self.x0 / self.resolution).fract();
		if phase < 0.0 { phase + 1.0 } else { phase }
	}

	/// Phase of the level grid in Y: `frac(y0 / resolution)`, in `[0,1)`.
	pub fn phase_y(&self) -> f64 {
		let phase = (self.y0 / self.resolution).fract();
		if phase < 0.0 { phase + 1.0 } else { phase }
	}
}
