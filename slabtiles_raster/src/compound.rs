//! This module provides the [`CompoundImage`]: a rectangular grid of
//! sub-images of compatible resolution, stitched into one raster.

use crate::image::{BoxImage, Image, RasterGeometry};
use anyhow::{Result, ensure};
use slabtiles_core::BoundingBox;

/// An M×N grid of images, row-major, top row first.
///
/// The height is the sum of the rows' heights and the width the sum of the
/// first row's widths. A cursor tracks the sub-image row of the last pulled
/// line, so ordered pulls locate their row in constant time.
pub struct CompoundImage {
	geometry: RasterGeometry,
	images: Vec<Vec<BoxImage>>,
	/// First output line of the current sub-image row.
	top: i64,
	current_row: usize,
}

impl CompoundImage {
	pub fn new(images: Vec<Vec<BoxImage>>) -> Result<CompoundImage> {
		ensure!(
			!images.is_empty() && !images[0].is_empty(),
			"a compound image needs at least one sub-image"
		);
		let columns = images[0].len();
		ensure!(
			images.iter().all(|row| row.len() == columns),
			"all rows of a compound image need the same number of sub-images"
		);

		let width: u32 = images[0].iter().map(|image| image.width()).sum();
		let height: u32 = images.iter().map(|row| row[0].height()).sum();
		let channels = images[0][0].channels();

		let last_row = &images[images.len() - 1];
		let bbox = BoundingBox::new(
			last_row[0].bbox().x_min,
			last_row[0].bbox().y_min,
			images[0][columns - 1].bbox().x_max,
			images[0][columns - 1].bbox().y_max,
		);

		Ok(CompoundImage {
			geometry: RasterGeometry::new(width, height, channels, bbox),
			images,
			top: 0,
			current_row: 0,
		})
	}

	/// Moves the row cursor onto `line` and returns the line index within
	/// the current sub-image row.
	fn seek_row(&mut self, line: i64) -> i64 {
		while self.top + i64::from(self.images[self.current_row][0].height()) <= line {
			self.top += i64::from(self.images[self.current_row][0].height());
			self.current_row += 1;
		}
		while self.top > line {
			self.current_row -= 1;
			self.top -= i64::from(self.images[self.current_row][0].height());
		}
		line - self.top
	}
}

impl Image for CompoundImage {
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
		let sub_line = self.seek_row(line);
		let channels = self.geometry.channels() as usize;

		let mut offset = 0usize;
		for image in &mut self.images[self.current_row] {
			let samples = image.width() as usize * channels;
			image.get_line_u8(sub_line, &mut buffer[offset..offset + samples]);
			offset += samples;
		}
		offset
	}

	fn get_line_f32(&mut self, line: i64, buffer: &mut [f32]) -> usize {
		if line < 0 || line >= i64::from(self.geometry.height()) {
			return 0;
		}
		let sub_line = self.seek_row(line);
		let channels = self.geometry.channels() as usize;

		let mut offset = 0usize;
		for image in &mut self.images[self.current_row] {
			let samples = image.width() as usize * channels;
			image.get_line_f32(sub_line, &mut buffer[offset..offset + samples]);
			offset += samples;
		}
		offset
	}
}
