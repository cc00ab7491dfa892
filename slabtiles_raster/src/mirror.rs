//! This module provides the [`MirrorImage`]: a synthetic halo around a
//! source image, filled by reflecting the source across the shared edge.
//!
//! Mirrors supply the pixels an interpolation kernel needs beyond the data
//! it is given; every mirror pixel is virtual, reflected from real ones.

use crate::image::{BoxImage, Image, RasterGeometry};
use anyhow::{Result, ensure};
use slabtiles_core::BoundingBox;

/// Side of the source the mirror extends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MirrorSide {
	Top,
	Right,
	Bottom,
	Left,
}

/// A reflection halo along one side of a source image.
///
/// Top and bottom mirrors are `source width + 2*size` wide and `size` tall,
/// with the corners filled by further reflecting the row ends; left and
/// right mirrors are `size` wide and `source height` tall.
pub struct MirrorImage {
	geometry: RasterGeometry,
	source: BoxImage,
	side: MirrorSide,
	size: u32,
	line_f32: Vec<f32>,
	line_u8: Vec<u8>,
}

impl MirrorImage {
	pub fn new(source: BoxImage, side: MirrorSide, size: u32) -> Result<MirrorImage> {
		ensure!(
			size <= source.width() && size <= source.height(),
			"source image is smaller than the {size} pixels needed for mirrors"
		);

		let bbox = source.bbox();
		let res_x = source.res_x();
		let res_y = source.res_y();
		let (width, height, mirror_bbox) = match side {
			MirrorSide::Top => (
				source.width() + 2 * size,
				size,
				BoundingBox::new(
					bbox.x_min - res_x * f64::from(size),
					bbox.y_max,
					bbox.x_max + res_x * f64::from(size),
					bbox.y_max + res_y * f64::from(size),
				),
			),
			MirrorSide::Bottom => (
				source.width() + 2 * size,
				size,
				BoundingBox::new(
					bbox.x_min - res_x * f64::from(size),
					bbox.y_min - res_y * f64::from(size),
					bbox.x_max + res_x * f64::from(size),
					bbox.y_min,
				),
			),
			MirrorSide::Right => (
				size,
				source.height(),
				BoundingBox::new(bbox.x_max, bbox.y_min, bbox.x_max + res_x * f64::from(size), bbox.y_max),
			),
			MirrorSide::Left => (
				size,
				source.height(),
				BoundingBox::new(bbox.x_min - res_x * f64::from(size), bbox.y_min, bbox.x_min, bbox.y_max),
			),
		};

		let channels = source.channels();
		let samples = source.width() as usize * channels as usize;
		Ok(MirrorImage {
			geometry: RasterGeometry::new(width, height, channels, mirror_bbox),
			source,
			side,
			size,
			line_f32: vec![0.0; samples],
			line_u8: vec![0; samples],
		})
	}

	/// Source line reflected into mirror line `line`.
	fn source_line(&self, line: i64) -> i64 {
		match self.side {
			MirrorSide::Top => i64::from(self.geometry.height()) - line - 1,
			MirrorSide::Bottom => i64::from(self.source.height()) - line - 1,
			MirrorSide::Left | MirrorSide::Right => line,
		}
	}
}

/// Writes one horizontal mirror line: the source row centered, both ends
/// reflected into the corners.
fn reflect_row<T: Copy>(buffer: &mut [T], source_row: &[T], size: usize, channels: usize) {
	let source_width = source_row.len() / channels;
	let width = source_width + 2 * size;

	buffer[size * channels..(size + source_width) * channels].copy_from_slice(source_row);
	for j in 0..size {
		let left = (size - j - 1) * channels;
		buffer[j * channels..(j + 1) * channels].copy_from_slice(&source_row[left..left + channels]);
		let right = (source_width - size + j) * channels;
		buffer[(width - j - 1) * channels..(width - j) * channels].copy_from_slice(&source_row[right..right + channels]);
	}
}

/// Writes one vertical mirror line from a full source row.
fn reflect_column<T: Copy>(buffer: &mut [T], source_row: &[T], size: usize, channels: usize, side: MirrorSide) {
	let source_width = source_row.len() / channels;
	for j in 0..size {
		let source_column = match side {
			MirrorSide::Left => size - j - 1,
			_ => source_width - j - 1,
		};
		let source = source_column * channels;
		buffer[j * channels..(j + 1) * channels].copy_from_slice(&source_row[source..source + channels]);
	}
}

impl Image for MirrorImage {
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
		let source_line = self.source_line(line);
		let size = self.size as usize;
		let channels = self.geometry.channels() as usize;

		let Self { source, line_u8, .. } = self;
		source.get_line_u8(source_line, line_u8);

		match self.side {
			MirrorSide::Top | MirrorSide::Bottom => reflect_row(buffer, line_u8, size, channels),
			MirrorSide::Left | MirrorSide::Right => reflect_column(buffer, line_u8, size, channels, self.side),
		}
		self.geometry.width() as usize * channels
	}

	fn get_line_f32(&mut self, line: i64, buffer: &mut [f32]) -> usize {
		if line < 0 || line >= i64::from(self.geometry.height()) {
			return 0;
		}
		let source_line = self.source_line(line);
		let size = self.size as usize;
		let channels = self.geometry.channels() as usize;

		let Self { source, line_f32, .. } = self;
		source.get_line_f32(source_line, line_f32);

		match self.side {
			MirrorSide::Top | MirrorSide::Bottom => reflect_row(buffer, line_f32, size, channels),
			MirrorSide::Left | MirrorSide::Right => reflect_column(buffer, line_f32, size, channels, self.side),
		}
		self.geometry.width() as usize * channels
	}
}
