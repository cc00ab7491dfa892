//! This module provides the [`DecimatedImage`]: every k-th pixel of a
//! source image, phase-preserved, nodata where the source does not reach.

use crate::image::{BoxImage, Image, RasterGeometry};
use anyhow::{Result, ensure};
use log::warn;
use slabtiles_core::BoundingBox;

/// A decimated view over a source image.
///
/// The output resolution is an integer multiple of the source resolution and
/// the output pixel centers sit on source pixel centers. Off-source pixels
/// receive the nodata value; a source mask, when present, keeps masked-out
/// source pixels from overwriting nodata.
pub struct DecimatedImage {
	geometry: RasterGeometry,
	source: BoxImage,
	nodata: Vec<f32>,
	ratio_x: usize,
	ratio_y: usize,
	/// First output column fed by the source.
	image_offset_x: usize,
	/// Source column feeding that first output column.
	source_offset_x: usize,
	/// Output columns fed by the source (0 when disjoint in X).
	number_x: usize,
	line_f32: Vec<f32>,
	line_u8: Vec<u8>,
	mask_line: Vec<u8>,
}

fn is_integer_multiple(value: f64) -> bool {
	let fraction = value.fract();
	fraction <= 0.0001 || fraction >= 0.9999
}

/// Source column containing terrain X; for pixel-center coordinates the
/// conversion must truncate, not round.
fn column_containing(source: &RasterGeometry, x: f64) -> i64 {
	((x - source.bbox().x_min) / source.res_x()).floor() as i64
}

/// Source line containing terrain Y.
fn line_containing(source: &RasterGeometry, y: f64) -> i64 {
	((source.bbox().y_max - y) / source.res_y()).floor() as i64
}

impl DecimatedImage {
	pub fn new(source: BoxImage, bbox: BoundingBox, res_x: f64, res_y: f64, nodata: Vec<f32>) -> Result<DecimatedImage> {
		ensure!(
			is_integer_multiple(res_x / source.res_x()) && is_integer_multiple(res_y / source.res_y()),
			"decimated resolution must be an integer multiple of the source resolution"
		);

		// output pixel centers must sit on source pixel centers
		let x_center = bbox.x_min + 0.5 * res_x;
		let y_center = bbox.y_max - 0.5 * res_y;
		let x_center_source = source.bbox().x_min + 0.5 * source.res_x();
		let y_center_source = source.bbox().y_max - 0.5 * source.res_y();
		ensure!(
			is_integer_multiple((x_center - x_center_source) / source.res_x())
				&& is_integer_multiple((y_center - y_center_source) / source.res_y()),
			"decimated pixel centers must be aligned with source pixel centers"
		);

		let width = (bbox.width() / res_x + 0.5) as u32;
		let height = (bbox.height() / res_y + 0.5) as u32;
		let channels = source.channels();
		ensure!(
			nodata.len() == channels as usize,
			"nodata must carry one value per channel"
		);

		let ratio_x = (res_x / source.res_x() + 0.5) as usize;
		let ratio_y = (res_y / source.res_y() + 0.5) as usize;

		// locate the first and last output columns fed by the source
		let mut image_offset_x = 0usize;
		let mut source_offset_x = 0usize;
		let mut number_x = 0usize;

		let first_center = x_center;
		let last_center = bbox.x_max - 0.5 * res_x;
		let first_source = column_containing(source.geometry(), first_center);
		let last_source = column_containing(source.geometry(), last_center);

		if first_source < i64::from(source.width()) && last_source >= 0 {
			let mut x_current = first_center;
			while x_current < source.bbox().x_min {
				image_offset_x += 1;
				x_current += res_x;
			}
			source_offset_x = column_containing(source.geometry(), x_current).max(0) as usize;

			let mut x_last = last_center;
			while x_last > source.bbox().x_max {
				x_last -= res_x;
			}
			let last_used = column_containing(source.geometry(), x_last) as usize;
			number_x = (last_used - source_offset_x) / ratio_x + 1;
			if (last_used - source_offset_x) % ratio_x != 0 {
				warn!("decimated column range is not a whole number of steps");
			}
		}

		let source_samples = source.width() as usize * channels as usize;
		let source_width = source.width() as usize;
		Ok(DecimatedImage {
			geometry: RasterGeometry::new(width, height, channels, bbox),
			source,
			nodata,
			ratio_x,
			ratio_y,
			image_offset_x,
			source_offset_x,
			number_x,
			line_f32: vec![0.0; source_samples],
			line_u8: vec![0; source_samples],
			mask_line: vec![0; source_width],
		})
	}

	/// Source line feeding output line `line`, or `None` off the source.
	fn source_line(&self, line: i64) -> Option<i64> {
		let y_center = self.geometry.bbox().y_max - (0.5 + line as f64) * self.geometry.res_y();
		let source_line = line_containing(self.source.geometry(), y_center);
		(source_line >= 0 && source_line < i64::from(self.source.height())).then_some(source_line)
	}
}

impl Image for DecimatedImage {
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
		let channels = self.geometry.channels() as usize;
		let samples = self.geometry.width() as usize * channels;
		for (i, sample) in buffer[..samples].iter_mut().enumerate() {
			*sample = self.nodata[i % channels].round().clamp(0.0, 255.0) as u8;
		}

		if self.number_x == 0 {
			return samples;
		}
		let Some(source_line) = self.source_line(line) else {
			return samples;
		};

		let Self {
			source,
			line_u8,
			mask_line,
			..
		} = self;
		source.get_line_u8(source_line, line_u8);

		let has_mask = source.geometry().mask().is_some();
		if has_mask {
			let mask = source.geometry_mut().mask_mut().expect("mask present");
			mask.get_line_u8(source_line, mask_line);
		}

		for i in 0..self.number_x {
			let source_column = self.source_offset_x + i * self.ratio_x;
			if has_mask && mask_line[source_column] == 0 {
				continue;
			}
			let target = (self.image_offset_x + i) * channels;
			buffer[target..target + channels]
				.copy_from_slice(&line_u8[source_column * channels..(source_column + 1) * channels]);
		}
		samples
	}

	fn get_line_f32(&mut self, line: i64, buffer: &mut [f32]) -> usize {
		if line < 0 || line >= i64::from(self.geometry.height()) {
			return 0;
		}
		let channels = self.geometry.channels() as usize;
		let samples = self.geometry.width() as usize * channels;
		for (i, sample) in buffer[..samples].iter_mut().enumerate() {
			*sample = self.nodata[i % channels];
		}

		if self.number_x == 0 {
			return samples;
		}
		let Some(source_line) = self.source_line(line) else {
			return samples;
		};

		let Self {
			source,
			line_f32,
			mask_line,
			..
		} = self;
		source.get_line_f32(source_line, line_f32);

		let has_mask = source.geometry().mask().is_some();
		if has_mask {
			let mask = source.geometry_mut().mask_mut().expect("mask present");
			mask.get_line_u8(source_line, mask_line);
		}

		for i in 0..self.number_x {
			let source_column = self.source_offset_x + i * self.ratio_x;
			if has_mask && mask_line[source_column] == 0 {
				continue;
			}
			let target = (self.image_offset_x + i) * channels;
			buffer[target..target + channels]
				.copy_from_slice(&line_f32[source_column * channels..(source_column + 1) * channels]);
		}
		samples
	}
}
