//! This module provides the [`ExtendedCompoundImage`]: an unordered overlay
//! of compatible images over a nodata background, later images painting over
//! earlier ones, with optional per-image data masks.

use crate::image::{BoxImage, Image, RasterGeometry};
use anyhow::{Result, ensure};
use slabtiles_core::BoundingBox;

/// Threshold above which a mask sample means "data".
const MASK_THRESHOLD: u8 = 127;

/// Overlay of images sharing resolution and phase.
pub struct ExtendedCompoundImage {
	geometry: RasterGeometry,
	images: Vec<BoxImage>,
	nodata: Vec<f32>,
	use_masks: bool,
	line_f32: Vec<f32>,
	line_u8: Vec<u8>,
	mask_line: Vec<u8>,
}

impl ExtendedCompoundImage {
	pub fn new(
		width: u32,
		height: u32,
		bbox: BoundingBox,
		images: Vec<BoxImage>,
		nodata: Vec<f32>,
		use_masks: bool,
	) -> Result<ExtendedCompoundImage> {
		ensure!(!images.is_empty(), "an extended compound image needs at least one image");

		for pair in images.windows(2) {
			ensure!(
				pair[0].geometry().is_compatible_with(pair[1].geometry()),
				"images are not all compatible in resolution and phase"
			);
		}

		let channels = nodata.len() as u16;
		ensure!(
			images.iter().all(|image| image.channels() == channels),
			"all images must carry {channels} channels"
		);

		let max_samples = images
			.iter()
			.map(|image| image.width() as usize * channels as usize)
			.max()
			.unwrap_or(0);
		let max_width = images.iter().map(|image| image.width() as usize).max().unwrap_or(0);

		Ok(ExtendedCompoundImage {
			geometry: RasterGeometry::new(width, height, channels, bbox),
			images,
			nodata,
			use_masks,
			line_f32: vec![0.0; max_samples],
			line_u8: vec![0; max_samples],
			mask_line: vec![0; max_width],
		})
	}

	/// Columns of the intersection between an overlay image and the output
	/// line: `(first output column, column count, first source column)`.
	///
	/// The test works in pixel indices, not terrain floats.
	fn intersection_columns(geometry: &RasterGeometry, image: &RasterGeometry) -> Option<(usize, usize, usize)> {
		if image.bbox().x_min >= geometry.bbox().x_max || image.bbox().x_max <= geometry.bbox().x_min {
			return None;
		}
		let start = geometry.x_to_column(image.bbox().x_min);
		let c0 = start.max(0) as usize;
		let c1 = (geometry.x_to_column(image.bbox().x_max).min(i64::from(geometry.width()))) as usize;
		if c1 <= c0 {
			return None;
		}
		let c2 = (-start.min(0)) as usize;
		Some((c0, c1 - c0, c2))
	}

	/// `true` when `image` covers the output line `line`.
	fn covers_line(geometry: &RasterGeometry, image: &RasterGeometry, line: i64) -> bool {
		geometry.y_to_line(image.bbox().y_min) > line && geometry.y_to_line(image.bbox().y_max) <= line
	}
}

impl Image for ExtendedCompoundImage {
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
		let Self {
			geometry,
			images,
			nodata,
			use_masks,
			line_u8,
			mask_line,
			..
		} = self;
		let channels = geometry.channels() as usize;
		let samples = geometry.width() as usize * channels;

		for (i, sample) in buffer[..samples].iter_mut().enumerate() {
			*sample = nodata[i % channels].round().clamp(0.0, 255.0) as u8;
		}

		let y = geometry.line_to_y(line);
		for image in images.iter_mut() {
			if !Self::covers_line(geometry, image.geometry(), line) {
				continue;
			}
			let Some((c0, count, c2)) = Self::intersection_columns(geometry, image.geometry()) else {
				continue;
			};

			let source_line = image.geometry().y_to_line(y);
			image.get_line_u8(source_line, line_u8);

			if *use_masks && image.geometry().mask().is_some() {
				let mask = image.geometry_mut().mask_mut().expect("mask present");
				mask.get_line_u8(source_line, mask_line);
				for j in 0..count {
					if mask_line[c2 + j] >= MASK_THRESHOLD {
						buffer[(c0 + j) * channels..(c0 + j + 1) * channels]
							.copy_from_slice(&line_u8[(c2 + j) * channels..(c2 + j + 1) * channels]);
					}
				}
			} else {
				buffer[c0 * channels..(c0 + count) * channels]
					.copy_from_slice(&line_u8[c2 * channels..(c2 + count) * channels]);
			}
		}
		samples
	}

	fn get_line_f32(&mut self, line: i64, buffer: &mut [f32]) -> usize {
		if line < 0 || line >= i64::from(self.geometry.height()) {
			return 0;
		}
		let Self {
			geometry,
			images,
			nodata,
			use_masks,
			line_f32,
			mask_line,
			..
		} = self;
		let channels = geometry.channels() as usize;
		let samples = geometry.width() as usize * channels;

		for (i, sample) in buffer[..samples].iter_mut().enumerate() {
			*sample = nodata[i % channels];
		}

		let y = geometry.line_to_y(line);
		for image in images.iter_mut() {
			if !Self::covers_line(geometry, image.geometry(), line) {
				continue;
			}
			let Some((c0, count, c2)) = Self::intersection_columns(geometry, image.geometry()) else {
				continue;
			};

			let source_line = image.geometry().y_to_line(y);
			image.get_line_f32(source_line, line_f32);

			if *use_masks && image.geometry().mask().is_some() {
				let mask = image.geometry_mut().mask_mut().expect("mask present");
				mask.get_line_u8(source_line, mask_line);
				for j in 0..count {
					if mask_line[c2 + j] >= MASK_THRESHOLD {
						buffer[(c0 + j) * channels..(c0 + j + 1) * channels]
							.copy_from_slice(&line_f32[(c2 + j) * channels..(c2 + j + 1) * channels]);
					}
				}
			} else {
				buffer[c0 * channels..(c0 + count) * channels]
					.copy_from_slice(&line_f32[c2 * channels..(c2 + count) * channels]);
			}
		}
		samples
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::empty::EmptyImage;
	use crate::raw::RawImage;
	use slabtiles_core::SampleFormat;

	fn flat(value: f32, bbox: BoundingBox) -> BoxImage {
		let width = bbox.width() as u32;
		let height = bbox.height() as u32;
		Box::new(EmptyImage::new(width, height, vec![value], bbox))
	}

	#[test]
	fn uncovered_pixels_keep_nodata() {
		let mut overlay = ExtendedCompoundImage::new(
			4,
			4,
			BoundingBox::new(0.0, 0.0, 4.0, 4.0),
			vec![flat(7.0, BoundingBox::new(1.0, 1.0, 3.0, 3.0))],
			vec![-9.0],
			false,
		)
		.unwrap();

		let mut buffer = [0f32; 4];
		overlay.get_line_f32(0, &mut buffer);
		assert_eq!(buffer, [-9.0, -9.0, -9.0, -9.0]);

		overlay.get_line_f32(2, &mut buffer);
		assert_eq!(buffer, [-9.0, 7.0, 7.0, -9.0]);
	}

	#[test]
	fn later_images_paint_over_earlier_ones() {
		let mut overlay = ExtendedCompoundImage::new(
			4,
			1,
			BoundingBox::new(0.0, 0.0, 4.0, 1.0),
			vec![
				flat(1.0, BoundingBox::new(0.0, 0.0, 3.0, 1.0)),
				flat(2.0, BoundingBox::new(2.0, 0.0, 4.0, 1.0)),
			],
			vec![0.0],
			false,
		)
		.unwrap();

		let mut buffer = [0f32; 4];
		overlay.get_line_f32(0, &mut buffer);
		assert_eq!(buffer, [1.0, 1.0, 2.0, 2.0]);
	}

	#[test]
	fn masked_pixels_do_not_overwrite() {
		// a 2x1 image whose mask keeps only the second pixel
		let mut masked: BoxImage = Box::new(RawImage::new(
			vec![50, 60],
			SampleFormat::UInt,
			8,
			2,
			1,
			1,
			BoundingBox::new(1.0, 0.0, 3.0, 1.0),
			(0, 0, 0, 0),
		));
		let mask = RawImage::new(
			vec![0, 255],
			SampleFormat::UInt,
			8,
			2,
			1,
			1,
			BoundingBox::new(1.0, 0.0, 3.0, 1.0),
			(0, 0, 0, 0),
		);
		masked.geometry_mut().set_mask(Box::new(mask)).unwrap();

		let mut overlay = ExtendedCompoundImage::new(
			4,
			1,
			BoundingBox::new(0.0, 0.0, 4.0, 1.0),
			vec![masked],
			vec![-1.0],
			true,
		)
		.unwrap();

		let mut buffer = [0f32; 4];
		overlay.get_line_f32(0, &mut buffer);
		assert_eq!(buffer, [-1.0, -1.0, 60.0, -1.0]);
	}

	#[test]
	fn incompatible_resolutions_are_rejected() {
		let result = ExtendedCompoundImage::new(
			4,
			4,
			BoundingBox::new(0.0, 0.0, 4.0, 4.0),
			vec![
				flat(1.0, BoundingBox::new(0.0, 0.0, 2.0, 2.0)),
				Box::new(EmptyImage::new(4, 4, vec![2.0], BoundingBox::new(0.0, 0.0, 2.0, 2.0))),
			],
			vec![0.0],
			false,
		);
		assert!(result.is_err());
	}
}
