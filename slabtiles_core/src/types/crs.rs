//! This module provides the [`Crs`] enum, the engine's coordinate reference
//! system registry.
//!
//! The registry is closed-form: geographic WGS84 and spherical web Mercator
//! are the only systems slabs are published in, so reprojection never needs
//! an external projection library.

use anyhow::{Result, bail};
use std::f64::consts::{FRAC_PI_4, PI};
use std::fmt;

/// Earth radius in meters, spherical model.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// A supported coordinate reference system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Crs {
	/// Geographic WGS84, coordinates in degrees (lon, lat).
	Epsg4326,
	/// Spherical web Mercator, coordinates in meters.
	Epsg3857,
}

impl Crs {
	/// Resolves a CRS identifier like `EPSG:4326` or `CRS:84`.
	pub fn from_identifier(id: &str) -> Result<Crs> {
		match id.to_ascii_uppercase().as_str() {
			"EPSG:4326" | "CRS:84" | "OGC:CRS84" => Ok(Crs::Epsg4326),
			"EPSG:3857" | "EPSG:900913" | "EPSG:3785" => Ok(Crs::Epsg3857),
			_ => bail!("unsupported CRS identifier '{id}'"),
		}
	}

	/// Transforms a point from `self` into `target`.
	///
	/// Latitudes outside the Mercator validity band produce non-finite
	/// values, which callers detect via the reprojection grid's NaN check.
	pub fn transform_to(&self, target: Crs, x: f64, y: f64) -> (f64, f64) {
		if *self == target {
			return (x, y);
		}
		match (*self, target) {
			(Crs::Epsg4326, Crs::Epsg3857) => {
				let mx = EARTH_RADIUS * x.to_radians();
				let my = EARTH_RADIUS * ((FRAC_PI_4 + y.to_radians() / 2.0).tan()).ln();
				(mx, my)
			}
			(Crs::Epsg3857, Crs::Epsg4326) => {
				let lon = (x / EARTH_RADIUS).to_degrees();
				let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
				(lon, lat)
			}
			_ => (x, y),
		}
	}
}

impl fmt::Display for Crs {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Crs::Epsg4326 => write!(f, "EPSG:4326"),
			Crs::Epsg3857 => write!(f, "EPSG:3857"),
		}
	}
}
