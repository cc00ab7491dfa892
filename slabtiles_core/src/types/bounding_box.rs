//! This module provides the [`BoundingBox`] struct, a rectangular terrain
//! extent in the coordinates of a CRS.

use std::fmt;

/// A rectangular extent in terrain coordinates.
///
/// `x_min`/`y_min` is the lower-left corner and `x_max`/`y_max` the
/// upper-right one. The unit is whatever the owning CRS uses (degrees for
/// geographic CRSes, meters for projected ones); images also use pixel-space
/// boxes where one unit is one pixel.
#[derive(Clone, Copy, PartialEq)]
pub struct BoundingBox {
	pub x_min: f64,
	pub y_min: f64,
	pub x_max: f64,
	pub y_max: f64,
}

impl BoundingBox {
	pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
		Self {
			x_min,
			y_min,
			x_max,
			y_max,
		}
	}

	/// Width of the box in terrain units.
	pub fn width(&self) -> f64 {
		self.x_max - self.x_min
	}

	/// Height of the box in terrain units.
	pub fn height(&self) -> f64 {
		self.y_max - self.y_min
	}

	/// Returns `true` if the two boxes share any area.
	pub fn intersects(&self, other: &BoundingBox) -> bool {
		self.x_min < other.x_max && self.x_max > other.x_min && self.y_min < other.y_max && self.y_max > other.y_min
	}

	/// Returns `true` if `other` lies entirely within this box.
	pub fn contains(&self, other: &BoundingBox) -> bool {
		other.x_min >= self.x_min && other.y_min >= self.y_min && other.x_max <= self.x_max && other.y_max <= self.y_max
	}

	/// Returns the intersection of the two boxes, or `None` if they are disjoint.
	pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
		if !self.intersects(other) {
			return None;
		}
		Some(BoundingBox::new(
			self.x_min.max(other.x_min),
			self.y_min.max(other.y_min),
			self.x_max.min(other.x_max),
			self.y_max.min(other.y_max),
		))
	}

	/// Returns `true` if any corner coordinate is NaN.
	pub fn has_nan(&self) -> bool {
		self.x_min.is_nan() || self.y_min.is_nan() || self.x_max.is_nan() || self.y_max.is_nan()
	}
}

impl fmt::Debug for BoundingBox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"BoundingBox[{}, {}, {}, {}]",
			self.x_min, self.y_min, self.x_max, self.y_max
		)
	}
}
