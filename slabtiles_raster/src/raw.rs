//! This module provides the [`RawImage`]: a decoded in-memory tile, served
//! with optional crop margins.

use crate::convert;
use crate::image::{Image, RasterGeometry};
use slabtiles_core::{BoundingBox, SampleFormat};

/// A decoded tile held in memory.
///
/// The buffer covers the full source tile; the image itself exposes the
/// rectangle left after removing the per-edge margins. A buffer shorter than
/// the tile (tolerated decoder mismatch) contributes what it holds, the rest
/// reads as zero.
pub struct RawImage {
	geometry: RasterGeometry,
	data: Vec<u8>,
	sample_format: SampleFormat,
	bits_per_sample: u16,
	source_width: u32,
	margin_left: u32,
	margin_top: u32,
}

impl RawImage {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		data: Vec<u8>,
		sample_format: SampleFormat,
		bits_per_sample: u16,
		source_width: u32,
		source_height: u32,
		channels: u16,
		bbox: BoundingBox,
		margins: (u32, u32, u32, u32),
	) -> RawImage {
		let (left, top, right, bottom) = margins;
		let width = source_width - left - right;
		let height = source_height - top - bottom;
		RawImage {
			geometry: RasterGeometry::new(width, height, channels, bbox),
			data,
			sample_format,
			bits_per_sample,
			source_width,
			margin_left: left,
			margin_top: top,
		}
	}

	fn sample_size(&self) -> usize {
		self.bits_per_sample as usize / 8
	}

	/// Bytes of the requested cropped line, clamped to the buffer.
	fn line_bytes(&self, line: i64) -> &[u8] {
		let channels = self.geometry.channels() as usize;
		let source_line = (line + i64::from(self.margin_top)) as usize;
		let start = (source_line * self.source_width as usize + self.margin_left as usize) * channels * self.sample_size();
		let end = start + self.geometry.width() as usize * channels * self.sample_size();
		let start = start.min(self.data.len());
		let end = end.min(self.data.len());
		&self.data[start..end]
	}
}

impl Image for RawImage {
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
		buffer[..samples].fill(0);
		let bytes = self.line_bytes(line);

		match (self.sample_format, self.bits_per_sample) {
			(SampleFormat::UInt, 8) => {
				buffer[..bytes.len()].copy_from_slice(bytes);
			}
			(SampleFormat::UInt, _) => {
				let values: Vec<u16> = bytes
					.chunks_exact(2)
					.map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
					.collect();
				convert::u16_to_u8(&values, &mut buffer[..values.len()]);
			}
			(SampleFormat::Float, _) => {
				let values: Vec<f32> = bytes
					.chunks_exact(4)
					.map(|quad| f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
					.collect();
				convert::f32_to_u8(&values, &mut buffer[..values.len()]);
			}
		}
		samples
	}

	fn get_line_f32(&mut self, line: i64, buffer: &mut [f32]) -> usize {
		if line < 0 || line >= i64::from(self.geometry.height()) {
			return 0;
		}
		let samples = self.line_samples();
		buffer[..samples].fill(0.0);
		let bytes = self.line_bytes(line);

		match (self.sample_format, self.bits_per_sample) {
			(SampleFormat::UInt, 8) => {
				convert::u8_to_f32(bytes, &mut buffer[..bytes.len()]);
			}
			(SampleFormat::UInt, _) => {
				let values: Vec<u16> = bytes
					.chunks_exact(2)
					.map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
					.collect();
				convert::u16_to_f32(&values, &mut buffer[..values.len()]);
			}
			(SampleFormat::Float, _) => {
				for (output, quad) in buffer.iter_mut().zip(bytes.chunks_exact(4)) {
					*output = f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
				}
			}
		}
		samples
	}
}
