//! The abstract lazy raster.
//!
//! # Overview
//!
//! Every image of the render graph, from a decoded tile to a reprojected
//! composite, exposes the same contract: pixel dimensions, a terrain
//! bounding box with derived resolutions, an optional data mask, and
//! scanline pulls in `u8` or `f32`. Scanlines are pulled strictly in order
//! within a request, which is what the operator caches rely on.

use slabtiles_core::BoundingBox;

/// An owned image of the render graph.
pub type BoxImage = Box<dyn Image + Send>;

/// Shared geometry of every image: dimensions, bounding box, resolutions and
/// the optional data mask.
pub struct RasterGeometry {
	width: u32,
	height: u32,
	channels: u16,
	bbox: BoundingBox,
	res_x: f64,
	res_y: f64,
	mask: Option<BoxImage>,
}

impl RasterGeometry {
	/// Builds a geometry; resolutions are derived from the box and the pixel
	/// dimensions.
	pub fn new(width: u32, height: u32, channels: u16, bbox: BoundingBox) -> RasterGeometry {
		let mut geometry = RasterGeometry {
			width,
			height,
			channels,
			bbox,
			res_x: 1.0,
			res_y: 1.0,
			mask: None,
		};
		geometry.compute_resolutions();
		geometry
	}

	fn compute_resolutions(&mut self) {
		self.res_x = self.bbox.width() / f64::from(self.width);
		self.res_y = self.bbox.height() / f64::from(self.height);
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	pub fn channels(&self) -> u16 {
		self.channels
	}

	pub fn bbox(&self) -> BoundingBox {
		self.bbox
	}

	/// Replaces the bounding box and recomputes the resolutions.
	pub fn set_bbox(&mut self, bbox: BoundingBox) {
		self.bbox = bbox;
		self.compute_resolutions();
	}

	pub fn res_x(&self) -> f64 {
		self.res_x
	}

	pub fn res_y(&self) -> f64 {
		self.res_y
	}

	pub fn mask(&self) -> Option<&BoxImage> {
		self.mask.as_ref()
	}

	pub fn mask_mut(&mut self) -> Option<&mut BoxImage> {
		self.mask.as_mut()
	}

	/// Attaches the data mask: single channel, same dimensions, values ≥127
	/// meaning "data".
	pub fn set_mask(&mut self, mask: BoxImage) -> anyhow::Result<()> {
		anyhow::ensure!(
			mask.width() == self.width && mask.height() == self.height && mask.channels() == 1,
			"invalid mask: expected {}x{} single-channel, got {}x{} with {} channels",
			self.width,
			self.height,
			mask.width(),
			mask.height(),
			mask.channels()
		);
		self.mask = Some(mask);
		Ok(())
	}

	/// Terrain X to column index.
	pub fn x_to_column(&self, x: f64) -> i64 {
		((x - self.bbox.x_min) / self.res_x).round() as i64
	}

	/// Terrain Y to line index.
	pub fn y_to_line(&self, y: f64) -> i64 {
		((self.bbox.y_max - y) / self.res_y).round() as i64
	}

	/// Column index to terrain X (left pixel edge).
	pub fn column_to_x(&self, column: i64) -> f64 {
		self.bbox.x_min + column as f64 * self.res_x
	}

	/// Line index to terrain Y (top pixel edge).
	pub fn line_to_y(&self, line: i64) -> f64 {
		self.bbox.y_max - line as f64 * self.res_y
	}

	/// Phase in X: offset of the pixel grid to the coordinate origin, in
	/// pixels, in `[0,1)`.
	pub fn phase_x(&self) -> f64 {
		let phase = (self.bbox.x_min / self.res_x).fract();
		if phase < 0.0 { phase + 1.0 } else { phase }
	}

	/// Phase in Y, in `[0,1)`.
	pub fn phase_y(&self) -> f64 {
		let phase = (self.bbox.y_max / self.res_y).fract();
		if phase < 0.0 { phase + 1.0 } else { phase }
	}

	/// Two images are compatible when resolutions agree within a thousandth
	/// of the smaller one and phases agree within 0.01 (modulo 1): they can
	/// then be stitched without resampling.
	pub fn is_compatible_with(&self, other: &RasterGeometry) -> bool {
		let epsilon_x = self.res_x.min(other.res_x) / 1000.0;
		let epsilon_y = self.res_y.min(other.res_y) / 1000.0;

		if (self.res_x - other.res_x).abs() > epsilon_x {
			return false;
		}
		if (self.res_y - other.res_y).abs() > epsilon_y {
			return false;
		}

		let phase_diff_x = (self.phase_x() - other.phase_x()).abs();
		if phase_diff_x > 0.01 && phase_diff_x < 0.99 {
			return false;
		}
		let phase_diff_y = (self.phase_y() - other.phase_y()).abs();
		if phase_diff_y > 0.01 && phase_diff_y < 0.99 {
			return false;
		}

		true
	}
}

/// The lazy raster contract.
///
/// `get_line_*` writes one channels-interleaved scanline into `buffer` and
/// returns the number of samples written; a line outside `[0, height)`
/// returns 0. The `u8` flavour copies samples as stored for 8-bit data and
/// converts otherwise; the `f32` flavour always converts.
pub trait Image {
	fn geometry(&self) -> &RasterGeometry;
	fn geometry_mut(&mut self) -> &mut RasterGeometry;

	fn get_line_u8(&mut self, line: i64, buffer: &mut [u8]) -> usize;
	fn get_line_f32(&mut self, line: i64, buffer: &mut [f32]) -> usize;

	fn width(&self) -> u32 {
		self.geometry().width()
	}

	fn height(&self) -> u32 {
		self.geometry().height()
	}

	fn channels(&self) -> u16 {
		self.geometry().channels()
	}

	fn bbox(&self) -> BoundingBox {
		self.geometry().bbox()
	}

	fn set_bbox(&mut self, bbox: BoundingBox) {
		self.geometry_mut().set_bbox(bbox);
	}

	fn res_x(&self) -> f64 {
		self.geometry().res_x()
	}

	fn res_y(&self) -> f64 {
		self.geometry().res_y()
	}

	/// Samples in one scanline.
	fn line_samples(&self) -> usize {
		self.geometry().width() as usize * self.geometry().channels() as usize
	}
}
