//! This module provides the [`Grid`]: the precomputed backward map used by
//! reprojection, from output pixel to source coordinates.

use anyhow::{Result, ensure};
use slabtiles_core::{BoundingBox, Crs};

/// Backward reprojection map.
///
/// One `(x, y)` pair per output pixel. The grid is built in the source CRS's
/// terrain coordinates by transforming every output pixel center, then moved
/// into source pixel coordinates with an affine transform.
pub struct Grid {
	width: u32,
	height: u32,
	xs: Vec<f64>,
	ys: Vec<f64>,
}

impl Grid {
	/// Samples the output raster `width`x`height` over `bbox` (in `from`
	/// coordinates) and reprojects every pixel center into `to` coordinates.
	///
	/// Fails when any reprojected coordinate is NaN, which means the source
	/// CRS does not cover the request.
	pub fn compute(width: u32, height: u32, bbox: BoundingBox, from: Crs, to: Crs) -> Result<Grid> {
		let res_x = bbox.width() / f64::from(width);
		let res_y = bbox.height() / f64::from(height);

		let mut xs = Vec::with_capacity((width * height) as usize);
		let mut ys = Vec::with_capacity((width * height) as usize);

		for line in 0..height {
			let y = bbox.y_max - (f64::from(line) + 0.5) * res_y;
			for column in 0..width {
				let x = bbox.x_min + (f64::from(column) + 0.5) * res_x;
				let (tx, ty) = from.transform_to(to, x, y);
				ensure!(
					tx.is_finite() && ty.is_finite(),
					"reprojection grid contains NaN: the source CRS does not cover the requested extent"
				);
				xs.push(tx);
				ys.push(ty);
			}
		}

		Ok(Grid { width, height, xs, ys })
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	/// Bounding box of the grid coordinates, in the target space.
	pub fn bbox(&self) -> BoundingBox {
		let mut bbox = BoundingBox::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
		for (&x, &y) in self.xs.iter().zip(&self.ys) {
			bbox.x_min = bbox.x_min.min(x);
			bbox.x_max = bbox.x_max.max(x);
			bbox.y_min = bbox.y_min.min(y);
			bbox.y_max = bbox.y_max.max(y);
		}
		bbox
	}

	/// Applies `x' = ax + b`, `y' = cy + d` to every grid point; this is how
	/// terrain coordinates become source pixel-center coordinates.
	pub fn affine_transform(&mut self, a: f64, b: f64, c: f64, d: f64) {
		for x in &mut self.xs {
			*x = a * *x + b;
		}
		for y in &mut self.ys {
			*y = c * *y + d;
		}
	}

	/// The mapped coordinates of output pixel `(column, line)`.
	pub fn get(&self, column: u32, line: u32) -> (f64, f64) {
		let index = (line * self.width + column) as usize;
		(self.xs[index], self.ys[index])
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;

	#[test]
	fn identity_grid_holds_pixel_centers() {
		let bbox = BoundingBox::new(0.0, 0.0, 4.0, 4.0);
		let grid = Grid::compute(4, 4, bbox, Crs::Epsg3857, Crs::Epsg3857).unwrap();

		assert_abs_diff_eq!(grid.get(0, 0).0, 0.5);
		assert_abs_diff_eq!(grid.get(0, 0).1, 3.5);
		assert_abs_diff_eq!(grid.get(3, 3).0, 3.5);
		assert_abs_diff_eq!(grid.get(3, 3).1, 0.5);
	}

	#[test]
	fn affine_moves_into_pixel_space() {
		let bbox = BoundingBox::new(0.0, 0.0, 8.0, 8.0);
		let mut grid = Grid::compute(2, 2, bbox, Crs::Epsg3857, Crs::Epsg3857).unwrap();

		// source: res 2, origin (0, 8): column = x/2 - 0.5, line = -y/2 + 3.5
		grid.affine_transform(0.5, -0.5, -0.5, 3.5);

		assert_abs_diff_eq!(grid.get(0, 0).0, 0.5);
		assert_abs_diff_eq!(grid.get(0, 0).1, 0.5);
		assert_abs_diff_eq!(grid.get(1, 1).0, 2.5);
		assert_abs_diff_eq!(grid.get(1, 1).1, 2.5);
	}

	#[test]
	fn geographic_to_mercator_grid() {
		let bbox = BoundingBox::new(-1.0, -1.0, 1.0, 1.0);
		let grid = Grid::compute(8, 8, bbox, Crs::Epsg4326, Crs::Epsg3857).unwrap();
		let mercator_bbox = grid.bbox();
		// about 111 km per degree at the equator
		assert!(mercator_bbox.x_min < -90_000.0 && mercator_bbox.x_max > 90_000.0);
	}

	#[test]
	fn out_of_band_latitudes_fail() {
		// latitudes beyond the pole have no Mercator image
		let bbox = BoundingBox::new(0.0, 89.0, 1.0, 91.0);
		assert!(Grid::compute(4, 4, bbox, Crs::Epsg4326, Crs::Epsg3857).is_err());
	}
}
