//! This module provides the [`ResampledImage`]: a source image resampled to
//! a new resolution and extent with an interpolation kernel.
//!
//! Resampling is separable: each needed source line is first resampled in X
//! (those lines are cached, since consecutive output lines share most of
//! them), then the output line is a kernel-weighted sum of cached lines.
//! Ordered line pulls keep the cache effective.

use crate::convert;
use crate::image::{BoxImage, Image, RasterGeometry};
use crate::kernel::{Kernel, KernelType};
use anyhow::{Result, ensure};
use slabtiles_core::BoundingBox;

/// Mask samples at or above this value mean "data".
const MASK_THRESHOLD: u8 = 127;

struct CachedLine {
	source_line: i64,
	/// X-resampled samples, channels interleaved.
	values: Vec<f32>,
	/// Per-column sums of effective weights; empty without masks.
	weights: Vec<f32>,
}

/// A kernel-resampled view of a source image.
pub struct ResampledImage {
	geometry: RasterGeometry,
	source: BoxImage,
	kernel: &'static Kernel,
	ratio_x: f64,
	ratio_y: f64,
	offset_x: f64,
	offset_y: f64,
	use_masks: bool,
	x_starts: Vec<i64>,
	x_weights: Vec<Vec<f32>>,
	cache: Vec<Option<CachedLine>>,
	source_line_f32: Vec<f32>,
	source_mask_line: Vec<u8>,
	output_line_f32: Vec<f32>,
}

impl ResampledImage {
	/// Wraps `source`, producing `width`x`height` pixels over `bbox`.
	///
	/// The ratios (input pixels per output pixel) and the sub-pixel offsets
	/// are derived from the two geometries.
	pub fn new(
		source: BoxImage,
		width: u32,
		height: u32,
		bbox: BoundingBox,
		kernel_type: KernelType,
		use_masks: bool,
	) -> Result<ResampledImage> {
		ensure!(width > 0 && height > 0, "a resampled image needs positive dimensions");

		let res_x = bbox.width() / f64::from(width);
		let res_y = bbox.height() / f64::from(height);
		let ratio_x = res_x / source.res_x();
		let ratio_y = res_y / source.res_y();

		// source pixel-center coordinate of the first output pixel center
		let offset_x = (bbox.x_min - source.bbox().x_min) / source.res_x() + 0.5 * ratio_x - 0.5;
		let offset_y = (source.bbox().y_max - bbox.y_max) / source.res_y() + 0.5 * ratio_y - 0.5;

		let kernel = Kernel::get(kernel_type);

		let mut x_starts = Vec::with_capacity(width as usize);
		let mut x_weights = Vec::with_capacity(width as usize);
		for i in 0..width {
			let center = offset_x + f64::from(i) * ratio_x;
			let (start, weights) = kernel.weights(center, ratio_x, source.width() as usize);
			x_starts.push(start);
			x_weights.push(weights);
		}

		// enough slots for every source line one output line can touch
		let cache_size = (2.0 * kernel.support(ratio_y)).ceil() as usize + 2;

		let channels = source.channels() as usize;
		let source_samples = source.width() as usize * channels;
		let source_width = source.width() as usize;
		let output_samples = width as usize * channels;

		Ok(ResampledImage {
			geometry: RasterGeometry::new(width, height, channels as u16, bbox),
			source,
			kernel,
			ratio_x,
			ratio_y,
			offset_x,
			offset_y,
			use_masks,
			x_starts,
			x_weights,
			cache: (0..cache_size).map(|_| None).collect(),
			source_line_f32: vec![0.0; source_samples],
			source_mask_line: vec![0; source_width],
			output_line_f32: vec![0.0; output_samples],
		})
	}

	/// The input pixels averaged per output pixel, X wise.
	pub fn ratio_x(&self) -> f64 {
		self.ratio_x
	}

	/// The input pixels averaged per output pixel, Y wise.
	pub fn ratio_y(&self) -> f64 {
		self.ratio_y
	}

	/// Resamples source line `source_line` in X into its cache slot and
	/// returns the slot index.
	fn x_resampled(&mut self, source_line: i64) -> usize {
		let slot = source_line.rem_euclid(self.cache.len() as i64) as usize;
		if self.cache[slot].as_ref().is_some_and(|c| c.source_line == source_line) {
			return slot;
		}

		let channels = self.geometry.channels() as usize;
		let width = self.geometry.width() as usize;
		let source_width = self.source.width() as i64;

		self.source.get_line_f32(source_line, &mut self.source_line_f32);
		let with_mask = self.use_masks && self.source.geometry().mask().is_some();
		if with_mask {
			let mask = self.source.geometry_mut().mask_mut().expect("mask present");
			mask.get_line_u8(source_line, &mut self.source_mask_line);
		}

		let mut values = vec![0.0f32; width * channels];
		let mut weights = if with_mask { vec![0.0f32; width] } else { Vec::new() };

		for i in 0..width {
			let start = self.x_starts[i];
			for (k, &weight) in self.x_weights[i].iter().enumerate() {
				let column = (start + k as i64).clamp(0, source_width - 1) as usize;
				if with_mask {
					if self.source_mask_line[column] < MASK_THRESHOLD {
						continue;
					}
					weights[i] += weight;
				}
				for c in 0..channels {
					values[i * channels + c] += weight * self.source_line_f32[column * channels + c];
				}
			}
		}

		self.cache[slot] = Some(CachedLine {
			source_line,
			values,
			weights,
		});
		slot
	}

	fn compute_line_f32(&mut self, line: i64, buffer: &mut [f32]) {
		let channels = self.geometry.channels() as usize;
		let width = self.geometry.width() as usize;
		let samples = width * channels;

		let center_y = self.offset_y + line as f64 * self.ratio_y;
		let (y_start, y_weights) = self.kernel.weights(center_y, self.ratio_y, self.source.height() as usize);
		let source_height = i64::from(self.source.height());

		buffer[..samples].fill(0.0);
		let mut weight_sums = if self.use_masks { vec![0.0f32; width] } else { Vec::new() };

		for (k, &y_weight) in y_weights.iter().enumerate() {
			let source_line = (y_start + k as i64).clamp(0, source_height - 1);
			let slot = self.x_resampled(source_line);
			let cached = self.cache[slot].as_ref().expect("slot filled above");

			for (output, &value) in buffer[..samples].iter_mut().zip(&cached.values) {
				*output += y_weight * value;
			}
			if self.use_masks && !cached.weights.is_empty() {
				for (sum, &weight) in weight_sums.iter_mut().zip(&cached.weights) {
					*sum += y_weight * weight;
				}
			}
		}

		if self.use_masks {
			for i in 0..width {
				let weight_sum = weight_sums[i];
				for c in 0..channels {
					if weight_sum.abs() > 1e-6 {
						buffer[i * channels + c] /= weight_sum;
					} else {
						buffer[i * channels + c] = 0.0;
					}
				}
			}
		}
	}
}

impl Image for ResampledImage {
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
	use slabtiles_core::SampleFormat;

	fn flat_source(value: u8, width: u32, height: u32) -> BoxImage {
		let data = vec![value; (width * height) as usize];
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
	fn flat_images_stay_flat_under_any_kernel() {
		for kernel_type in [
			KernelType::NearestNeighbour,
			KernelType::Linear,
			KernelType::Cubic,
			KernelType::Lanczos3,
		] {
			let mut resampled = ResampledImage::new(
				flat_source(100, 16, 16),
				11,
				7,
				BoundingBox::new(1.0, 1.0, 14.0, 15.0),
				kernel_type,
				false,
			)
			.unwrap();

			let mut buffer = vec![0f32; 11];
			for line in 0..7 {
				assert_eq!(resampled.get_line_f32(line, &mut buffer), 11);
				for &value in &buffer {
					assert!(
						(value - 100.0).abs() < 1e-3,
						"kernel {kernel_type:?} disturbed a flat image: {value}"
					);
				}
			}
		}
	}

	#[test]
	fn identity_resample_reproduces_the_source() {
		// same grid in and out: the kernel collapses to a single spike
		let data: Vec<u8> = (0..64).collect();
		let source: BoxImage = Box::new(RawImage::new(
			data.clone(),
			SampleFormat::UInt,
			8,
			8,
			8,
			1,
			BoundingBox::new(0.0, 0.0, 8.0, 8.0),
			(0, 0, 0, 0),
		));

		let mut resampled = ResampledImage::new(
			source,
			8,
			8,
			BoundingBox::new(0.0, 0.0, 8.0, 8.0),
			KernelType::Lanczos2,
			false,
		)
		.unwrap();

		let mut buffer = [0u8; 8];
		for line in 0..8 {
			resampled.get_line_u8(line, &mut buffer);
			assert_eq!(buffer.as_slice(), &data[line as usize * 8..(line as usize + 1) * 8]);
		}
	}

	#[test]
	fn linear_kernel_reproduces_a_ramp() {
		// values 10*column, pulled half a pixel off phase: linear
		// interpolation lands exactly between neighbours
		let data: Vec<u8> = (0..8).map(|column| column * 10).collect();
		let source: BoxImage = Box::new(RawImage::new(
			data,
			SampleFormat::UInt,
			8,
			8,
			1,
			1,
			BoundingBox::new(0.0, 0.0, 8.0, 1.0),
			(0, 0, 0, 0),
		));

		let mut resampled = ResampledImage::new(
			source,
			3,
			1,
			BoundingBox::new(2.5, 0.0, 5.5, 1.0),
			KernelType::Linear,
			false,
		)
		.unwrap();

		let mut buffer = [0f32; 3];
		resampled.get_line_f32(0, &mut buffer);
		for (i, &value) in buffer.iter().enumerate() {
			let expected = 25.0 + 10.0 * i as f32;
			assert!((value - expected).abs() < 1e-3, "pixel {i}: got {value}, expected {expected}");
		}
	}

	#[test]
	fn masked_pixels_do_not_contribute() {
		// left half masked out; values there are 255, elsewhere 50
		let mut data = vec![50u8; 16];
		for line in 0..4 {
			data[line * 4] = 255;
			data[line * 4 + 1] = 255;
		}
		let mut source: BoxImage = Box::new(RawImage::new(
			data,
			SampleFormat::UInt,
			8,
			4,
			4,
			1,
			BoundingBox::new(0.0, 0.0, 4.0, 4.0),
			(0, 0, 0, 0),
		));
		let mask_data = vec![0u8, 0, 255, 255, 0, 0, 255, 255, 0, 0, 255, 255, 0, 0, 255, 255];
		let mask = RawImage::new(
			mask_data,
			SampleFormat::UInt,
			8,
			4,
			4,
			1,
			BoundingBox::new(0.0, 0.0, 4.0, 4.0),
			(0, 0, 0, 0),
		);
		source.geometry_mut().set_mask(Box::new(mask)).unwrap();

		let mut resampled = ResampledImage::new(
			source,
			2,
			2,
			BoundingBox::new(0.0, 0.0, 4.0, 4.0),
			KernelType::Linear,
			true,
		)
		.unwrap();

		// every surviving contribution is an unmasked 50: the masked 255s
		// never leak into the weighted sum
		let mut buffer = [0f32; 2];
		resampled.get_line_f32(0, &mut buffer);
		assert!((buffer[0] - 50.0).abs() < 1e-3, "got {}", buffer[0]);
		assert!((buffer[1] - 50.0).abs() < 1e-3, "got {}", buffer[1]);
	}

	#[test]
	fn without_masks_the_same_pixels_do_leak() {
		let mut data = vec![50u8; 16];
		for line in 0..4 {
			data[line * 4] = 255;
			data[line * 4 + 1] = 255;
		}
		let source: BoxImage = Box::new(RawImage::new(
			data,
			SampleFormat::UInt,
			8,
			4,
			4,
			1,
			BoundingBox::new(0.0, 0.0, 4.0, 4.0),
			(0, 0, 0, 0),
		));

		let mut resampled = ResampledImage::new(
			source,
			2,
			2,
			BoundingBox::new(0.0, 0.0, 4.0, 4.0),
			KernelType::Linear,
			false,
		)
		.unwrap();

		let mut buffer = [0f32; 2];
		resampled.get_line_f32(0, &mut buffer);
		assert!(buffer[0] > 100.0);
	}
}
