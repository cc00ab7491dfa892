//! This module provides the [`Pyramid`]: the ordered levels of one tile
//! matrix set, sharing pixel format and nodata.

use crate::level::Level;
use anyhow::{Result, bail, ensure};
use slabtiles_core::{Crs, TileMatrixSet};

/// A multi-resolution pyramid.
///
/// Levels are keyed by their tile matrix identifier and share sample format,
/// bits per sample, channel count and nodata cardinality; this is checked at
/// construction, no partial pyramid is ever returned.
pub struct Pyramid {
	tms: TileMatrixSet,
	levels: Vec<Level>,
}

impl Pyramid {
	pub fn new(tms: TileMatrixSet, levels: Vec<Level>) -> Result<Pyramid> {
		ensure!(!levels.is_empty(), "a pyramid needs at least one level");

		for level in &levels {
			if tms.matrix(level.id()).is_none() {
				bail!(
					"level '{}' references no tile matrix of set '{}'",
					level.id(),
					tms.id()
				);
			}
		}

		let reference = levels[0].format();
		for level in &levels[1..] {
			let format = level.format();
			ensure!(
				format.sample_format == reference.sample_format
					&& format.bits_per_sample == reference.bits_per_sample
					&& format.channels == reference.channels,
				"level '{}' does not share the pyramid's pixel format",
				level.id()
			);
			ensure!(
				level.nodata().len() == levels[0].nodata().len(),
				"level '{}' does not share the pyramid's nodata cardinality",
				level.id()
			);
		}

		Ok(Pyramid { tms, levels })
	}

	pub fn crs(&self) -> Crs {
		self.tms.crs()
	}

	pub fn tms(&self) -> &TileMatrixSet {
		&self.tms
	}

	/// Looks up a level by tile matrix identifier.
	pub fn level(&self, id: &str) -> Option<&Level> {
		self.levels.iter().find(|level| level.id() == id)
	}

	/// Mutable lookup; fetches need a mutable handle for slab memorization.
	pub fn level_mut(&mut self, id: &str) -> Option<&mut Level> {
		self.levels.iter_mut().find(|level| level.id() == id)
	}

	/// The level whose resolution is closest to `resolution`.
	pub fn best_level_for_resolution(&self, resolution: f64) -> &Level {
		self
			.levels
			.iter()
			.min_by(|a, b| {
				let da = (a.resolution() - resolution).abs();
				let db = (b.resolution() - resolution).abs();
				da.partial_cmp(&db).unwrap()
			})
			.expect("a pyramid always holds at least one level")
	}

	/// Iterates over the levels in pyramid order.
	pub fn iter(&self) -> impl Iterator<Item = &Level> {
		self.levels.iter()
	}

	pub fn len(&self) -> usize {
		self.levels.len()
	}

	pub fn is_empty(&self) -> bool {
		self.levels.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::level::LevelConfig;
	use slabtiles_core::storage::{FileStorage, SharedStorage};
	use slabtiles_core::{Compression, Photometric, PixelFormat, SampleFormat, TileMatrix};
	use std::sync::Arc;

	fn tms() -> TileMatrixSet {
		TileMatrixSet::new(
			"PM",
			Crs::Epsg3857,
			vec![
				TileMatrix::new("0", 4.0, 0.0, 1024.0, 16, 16, 8, 8).unwrap(),
				TileMatrix::new("1", 2.0, 0.0, 1024.0, 16, 16, 16, 16).unwrap(),
				TileMatrix::new("2", 1.0, 0.0, 1024.0, 16, 16, 32, 32).unwrap(),
			],
		)
		.unwrap()
	}

	fn level(storage: &SharedStorage, id: &str, resolution: f64, matrix_size: u32, channels: u16) -> Level {
		let nodata = vec![0.0; channels as usize];
		let photometric = if channels >= 3 { Photometric::Rgb } else { Photometric::Gray };
		Level::new(
			LevelConfig {
				tile_matrix: TileMatrix::new(id, resolution, 0.0, 1024.0, 16, 16, matrix_size, matrix_size).unwrap(),
				format: PixelFormat::new(SampleFormat::UInt, 8, channels, photometric, Compression::None).unwrap(),
				tiles_per_width: 4,
				tiles_per_height: 4,
				min_tile_col: 0,
				max_tile_col: matrix_size - 1,
				min_tile_row: 0,
				max_tile_row: matrix_size - 1,
				nodata,
				root: format!("PYRAMID/{id}"),
				path_depth: 2,
				prefix: format!("PYRAMID_{id}"),
			},
			SharedStorage::clone(storage),
		)
		.unwrap()
	}

	fn storage() -> (assert_fs::TempDir, SharedStorage) {
		let dir = assert_fs::TempDir::new().unwrap();
		let storage: SharedStorage = Arc::new(FileStorage::new(dir.path()));
		(dir, storage)
	}

	#[test]
	fn lookup_and_best_resolution() {
		let (_dir, storage) = storage();
		let pyramid = Pyramid::new(
			tms(),
			vec![
				level(&storage, "0", 4.0, 8, 3),
				level(&storage, "1", 2.0, 16, 3),
				level(&storage, "2", 1.0, 32, 3),
			],
		)
		.unwrap();

		assert_eq!(pyramid.len(), 3);
		assert!(pyramid.level("1").is_some());
		assert!(pyramid.level("9").is_none());

		assert_eq!(pyramid.best_level_for_resolution(1.1).id(), "2");
		assert_eq!(pyramid.best_level_for_resolution(1.6).id(), "1");
		assert_eq!(pyramid.best_level_for_resolution(100.0).id(), "0");
	}

	#[test]
	fn mixed_pixel_formats_are_rejected() {
		let (_dir, storage) = storage();
		let result = Pyramid::new(
			tms(),
			vec![level(&storage, "0", 4.0, 8, 3), level(&storage, "1", 2.0, 16, 1)],
		);
		assert!(result.is_err());
	}

	#[test]
	fn unknown_levels_are_rejected() {
		let (_dir, storage) = storage();
		let result = Pyramid::new(tms(), vec![level(&storage, "7", 4.0, 8, 3)]);
		assert!(result.is_err());
	}
}
