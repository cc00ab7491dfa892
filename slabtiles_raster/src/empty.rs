//! This module provides the [`EmptyImage`]: a synthetic image filled with
//! the nodata value, standing in for missing tiles.

use crate::image::{Image, RasterGeometry};
use slabtiles_core::BoundingBox;

/// A monochrome nodata image.
pub struct EmptyImage {
	geometry: RasterGeometry,
	nodata: Vec<f32>,
}

impl EmptyImage {
	/// Creates a nodata-filled image; `nodata` holds one value per channel.
	pub fn new(width: u32, height: u32, nodata: Vec<f32>, bbox: BoundingBox) -> EmptyImage {
		let channels = nodata.len() as u16;
		EmptyImage {
			geometry: RasterGeometry::new(width, height, channels, bbox),
			nodata,
		}
	}
}

impl Image for EmptyImage {
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
		let channels = self.nodata.len();
		for (i, sample) in buffer[..samples].iter_mut().enumerate() {
			*sample = self.nodata[i % channels].round().clamp(0.0, 255.0) as u8;
		}
		samples
	}

	fn get_line_f32(&mut self, line: i64, buffer: &mut [f32]) -> usize {
		if line < 0 || line >= i64::from(self.geometry.height()) {
			return 0;
		}
		let samples = self.line_samples();
		let channels = self.nodata.len();
		for (i, sample) in buffer[..samples].iter_mut().enumerate() {
			*sample = self.nodata[i % channels];
		}
		samples
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lines_carry_the_nodata_pattern() {
		let mut image = EmptyImage::new(4, 2, vec![255.0, 0.0, 0.0], BoundingBox::new(0.0, 0.0, 4.0, 2.0));
		assert_eq!(image.channels(), 3);

		let mut buffer = vec![1u8; 12];
		assert_eq!(image.get_line_u8(1, &mut buffer), 12);
		assert_eq!(&buffer[..6], &[255, 0, 0, 255, 0, 0]);
	}

	#[test]
	fn out_of_range_lines_return_zero() {
		let mut image = EmptyImage::new(4, 2, vec![0.0], BoundingBox::new(0.0, 0.0, 4.0, 2.0));
		let mut buffer = vec![0u8; 4];
		assert_eq!(image.get_line_u8(-1, &mut buffer), 0);
		assert_eq!(image.get_line_u8(2, &mut buffer), 0);

		let mut buffer = vec![0f32; 4];
		assert_eq!(image.get_line_f32(5, &mut buffer), 0);
	}
}
