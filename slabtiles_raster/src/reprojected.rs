//! This module provides the [`ReprojectedImage`]: a source image warped into
//! another CRS through a precomputed backward grid.
//!
//! Each output pixel gathers a kernel-weighted neighbourhood around its
//! grid-mapped source coordinate. The backward map is irregular, so source
//! lines are cached lazily for the lifetime of the image.

use crate::convert;
use crate::grid::Grid;
use crate::image::{BoxImage, Image, RasterGeometry};
use crate::kernel::{Kernel, KernelType};
use anyhow::{Result, ensure};
use slabtiles_core::BoundingBox;

/// A grid-warped view of a source image.
pub struct ReprojectedImage {
	geometry: RasterGeometry,
	source: BoxImage,
	grid: Grid,
	kernel: &'static Kernel,
	ratio_x: f64,
	ratio_y: f64,
	source_lines: Vec<Option<Vec<f32>>>,
	output_line_f32: Vec<f32>,
}

impl ReprojectedImage {
	/// Wraps `source` behind `grid`, which must already map output pixels to
	/// source pixel-center coordinates.
	///
	/// `ratio_x`/`ratio_y` are the scale changes (source pixels per output
	/// pixel) used to widen the kernel support on zoom-out.
	pub fn new(
		source: BoxImage,
		bbox: BoundingBox,
		grid: Grid,
		kernel_type: KernelType,
		ratio_x: f64,
		ratio_y: f64,
	) -> Result<ReprojectedImage> {
		ensure!(
			grid.width() > 0 && grid.height() > 0,
			"a reprojected image needs a non-empty grid"
		);

		let channels = source.channels();
		let samples = grid.width() as usize * channels as usize;
		let source_height = source.height() as usize;

		Ok(ReprojectedImage {
			geometry: RasterGeometry::new(grid.width(), grid.height(), channels, bbox),
			source,
			kernel: Kernel::get(kernel_type),
			grid,
			ratio_x,
			ratio_y,
			source_lines: (0..source_height).map(|_| None).collect(),
			output_line_f32: vec![0.0; samples],
		})
	}

	fn source_line(&mut self, line: i64) -> &[f32] {
		let line = line.clamp(0, self.source_lines.len() as i64 - 1) as usize;
		if self.source_lines[line].is_none() {
			let mut buffer = vec![0.0f32; self.source.line_samples()];
			self.source.get_line_f32(line as i64, &mut buffer);
			self.source_lines[line] = Some(buffer);
		}
		self.source_lines[line].as_deref().expect("line filled above")
	}

	fn compute_line_f32(&mut self, line: i64, buffer: &mut [f32]) {
		let channels = self.geometry.channels() as usize;
		let width = self.geometry.width() as usize;
		let source_width = i64::from(self.source.width());
		let source_height = i64::from(self.source.height());

		buffer[..width * channels].fill(0.0);

		for column in 0..width {
			let (x, y) = self.grid.get(column as u32, line as u32);
			let (x_start, x_weights) = self.kernel.weights(x, self.ratio_x, source_width as usize);
			let (y_start, y_weights) = self.kernel.weights(y, self.ratio_y, source_height as usize);

			for (k, &y_weight) in y_weights.iter().enumerate() {
				let source_line = (y_start + k as i64).clamp(0, source_height - 1);
				let samples = self.source_line(source_line);

				for (j, &x_weight) in x_weights.iter().enumerate() {
					let source_column = (x_start + j as i64).clamp(0, source_width - 1) as usize;
					let weight = y_weight * x_weight;
					for c in 0..channels {
						buffer[column * channels + c] += weight * samples[source_column * channels + c];
					}
				}
			}
		}
	}
}

impl Image for ReprojectedImage {
	fn geometry(&self) -> &RasterGeometry {
		&self.geometry
	}

	fn geometry_mut(&mut self) -> &mut RasterGeometry {
		&mut self.geometry
	}

	fn get_line_u8(&mut self, line: i64, buffer: &mut [u8]) -> usize {
		if line < 0 || line >= i64::from(self.geometry.height()) {
			return 0;
		}
		let samples = self.line_samples();
		let mut output = std::mem::take(&mut self.output_line_f32);
		self.compute_line_f32(line, &mut output);
		convert::f32_to_u8(&output[..samples], &mut buffer[..samples]);
		self.output_line_f32 = output;
		samples
	}

	fn get_line_f32(&mut self, line: i64, buffer: &mut [f32]) -> usize {
		if line < 0 || line >= i64::from(self.geometry.height()) {
			return 0;
		}
		self.compute_line_f32(line, buffer);
		self.line_samples()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::raw::RawImage;
	use slabtiles_core::{Crs, SampleFormat};

	fn gradient_source(width: u32, height: u32) -> BoxImage {
		let data: Vec<u8> = (0..width * height).map(|i| (i % 256) as u8).collect();
		Box::new(RawImage::new(
			data,
			SampleFormat::UInt,
			8,
			width,
			height,
			1,
			BoundingBox::new(0.0, 0.0, f64::from(width), f64::from(height)),
			(0, 0, 0, 0),
		))
	}

	#[test]
	fn identity_grid_reproduces_the_source() {
		let bbox = BoundingBox::new(0.0, 0.0, 8.0, 8.0);
		let mut grid = Grid::compute(8, 8, bbox, Crs::Epsg3857, Crs::Epsg3857).unwrap();
		// terrain to source pixel centers: res 1, origin top-left (0, 8)
		grid.affine_transform(1.0, -0.5, -1.0, 7.5);

		let source = gradient_source(8, 8);
		let mut reprojected = ReprojectedImage::new(source, bbox, grid, KernelType::Lanczos2, 1.0, 1.0).unwrap();

		let mut buffer = [0u8; 8];
		for line in 0..8u8 {
			reprojected.get_line_u8(i64::from(line), &mut buffer);
			let expected: Vec<u8> = (0..8).map(|column| line * 8 + column).collect();
			assert_eq!(buffer.as_slice(), expected.as_slice());
		}
	}

	#[test]
	fn nearest_warp_follows_the_grid() {
		let bbox = BoundingBox::new(0.0, 0.0, 4.0, 4.0);
		let mut grid = Grid::compute(4, 4, bbox, Crs::Epsg3857, Crs::Epsg3857).unwrap();
		// shift the map one source pixel to the right
		grid.affine_transform(1.0, 0.5, -1.0, 3.5);

		let mut reprojected =
			ReprojectedImage::new(gradient_source(4, 4), bbox, grid, KernelType::NearestNeighbour, 1.0, 1.0).unwrap();

		let mut buffer = [0u8; 4];
		reprojected.get_line_u8(0, &mut buffer);
		// column 0 reads source column 1, the right edge clamps
		assert_eq!(buffer, [1, 2, 3, 3]);
	}
}
