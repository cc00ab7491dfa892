//! This module provides the [`Level`]: the runtime binding of a tile matrix
//! to slab storage, and the orchestration of tile and window fetches.

use crate::error::FetchError;
use crate::limits::RequestLimits;
use anyhow::{Context, Result, ensure};
use log::{debug, warn};
use slabtiles_core::storage::{SharedStorage, Storage, StorageType};
use slabtiles_core::{Blob, BoundingBox, Crs, PixelFormat, TileMatrix};
use slabtiles_raster::{
	BoxImage, CompoundImage, EmptyImage, Grid, Image, Kernel, KernelType, RawImage, ReprojectedImage, ResampledImage,
};
use slabtiles_slab::{SlabReader, tiff_envelope};

/// Base-36 digits of filesystem slab paths (case-insensitive filesystems).
const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Phase tolerance of the resampling-free fast path, in pixels.
const EPS: f64 = 1.0 / 256.0;

/// Minimal per-side source padding of a reprojection, in pixels.
const REPROJECTION_PADDING: f64 = 50.0;

/// Pixel window in level coordinates; `x_max` and `y_max` are exclusive.
#[derive(Clone, Copy, Debug)]
struct PixelWindow {
	x_min: i64,
	y_min: i64,
	x_max: i64,
	y_max: i64,
}

/// Static description of a level.
#[derive(Clone, Debug)]
pub struct LevelConfig {
	pub tile_matrix: TileMatrix,
	pub format: PixelFormat,
	pub tiles_per_width: u32,
	pub tiles_per_height: u32,
	/// Valid tile-index window, inclusive.
	pub min_tile_col: u32,
	pub max_tile_col: u32,
	pub min_tile_row: u32,
	pub max_tile_row: u32,
	/// Pixel value synthesized for missing tiles, one value per channel.
	pub nodata: Vec<f32>,
	/// Root of the base-36 path tree (filesystem storage).
	pub root: String,
	/// Directory levels of the base-36 path tree.
	pub path_depth: u32,
	/// Object name prefix (object storage).
	pub prefix: String,
}

/// A pyramid level bound to its storage.
///
/// A `Level` handle memorizes the slab it last touched, so it is owned by a
/// single thread; concurrent requests each take their own handle (the
/// configuration is cheap to clone, the storage context is shared).
pub struct Level {
	config: LevelConfig,
	storage: SharedStorage,
	cached_slab: Option<(String, SlabReader)>,
}

fn euclidean_div(value: i64, divisor: i64) -> i64 {
	value.div_euclid(divisor)
}

fn euclidean_rem(value: i64, divisor: i64) -> i64 {
	value.rem_euclid(divisor)
}

impl Level {
	pub fn new(config: LevelConfig, storage: SharedStorage) -> Result<Level> {
		config.format.validate()?;
		ensure!(
			config.tiles_per_width >= 1 && config.tiles_per_height >= 1,
			"level '{}': slabs must group at least 1x1 tiles",
			config.tile_matrix.id()
		);
		ensure!(
			config.min_tile_col <= config.max_tile_col && config.min_tile_row <= config.max_tile_row,
			"level '{}': inconsistent tile-index window",
			config.tile_matrix.id()
		);
		ensure!(
			config.nodata.len() == config.format.channels as usize,
			"level '{}': nodata must carry one value per channel",
			config.tile_matrix.id()
		);
		Ok(Level {
			config,
			storage,
			cached_slab: None,
		})
	}

	pub fn id(&self) -> &str {
		self.config.tile_matrix.id()
	}

	pub fn tile_matrix(&self) -> &TileMatrix {
		&self.config.tile_matrix
	}

	pub fn format(&self) -> &PixelFormat {
		&self.config.format
	}

	pub fn resolution(&self) -> f64 {
		self.config.tile_matrix.resolution()
	}

	pub fn nodata(&self) -> &[f32] {
		&self.config.nodata
	}

	pub fn storage(&self) -> &SharedStorage {
		&self.storage
	}

	/// Terrain extent of the level's valid tile-index window.
	pub fn extent(&self) -> BoundingBox {
		let tm = &self.config.tile_matrix;
		let res = tm.resolution();
		let tile_width = f64::from(tm.tile_width());
		let tile_height = f64::from(tm.tile_height());

		let x_min = tm.x0() + f64::from(self.config.min_tile_col) * tile_width * res;
		let y_max = tm.y0() - f64::from(self.config.min_tile_row) * tile_height * res;
		let x_max = tm.x0() + f64::from(self.config.max_tile_col + 1) * tile_width * res;
		let y_min = tm.y0() - f64::from(self.config.max_tile_row + 1) * tile_height * res;
		BoundingBox::new(x_min, y_min, x_max, y_max)
	}

	/// Terrain extent of the slab holding tile `(x, y)`.
	pub fn slab_bbox(&self, tile_x: i64, tile_y: i64) -> BoundingBox {
		let tm = &self.config.tile_matrix;
		let res = tm.resolution();
		let slab_width = f64::from(tm.tile_width() * self.config.tiles_per_width) * res;
		let slab_height = f64::from(tm.tile_height() * self.config.tiles_per_height) * res;
		let slab_x = tile_x.div_euclid(i64::from(self.config.tiles_per_width));
		let slab_y = tile_y.div_euclid(i64::from(self.config.tiles_per_height));

		let x_min = tm.x0() + slab_x as f64 * slab_width;
		let y_max = tm.y0() - slab_y as f64 * slab_height;
		BoundingBox::new(x_min, y_max - slab_height, x_min + slab_width, y_max)
	}

	/// Name of the slab holding tile `(x, y)`.
	///
	/// Filesystems use hierarchical base-36 pairs of the slab indices under
	/// the level root; object stores use `{prefix}_{X}_{Y}`.
	pub fn slab_name(&self, tile_x: i64, tile_y: i64) -> String {
		let slab_x = tile_x / i64::from(self.config.tiles_per_width);
		let slab_y = tile_y / i64::from(self.config.tiles_per_height);

		match self.storage.storage_type() {
			StorageType::File => {
				let mut x = slab_x as u64;
				let mut y = slab_y as u64;

				// one pair of digits per directory level, least significant last
				let mut segments: Vec<String> = Vec::new();
				for _ in 0..self.config.path_depth {
					segments.push(
						[BASE36[(x % 36) as usize], BASE36[(y % 36) as usize]]
							.iter()
							.map(|&b| b as char)
							.collect(),
					);
					x /= 36;
					y /= 36;
				}

				// the remaining digits form the leading segment
				let mut leading: Vec<u8> = Vec::new();
				loop {
					leading.push(BASE36[(y % 36) as usize]);
					leading.push(BASE36[(x % 36) as usize]);
					x /= 36;
					y /= 36;
					if x == 0 && y == 0 {
						break;
					}
				}
				leading.reverse();

				let mut path = format!("{}/{}", self.config.root, String::from_utf8(leading).expect("base36 digits"));
				for segment in segments.iter().rev() {
					path.push('/');
					path.push_str(segment);
				}
				path.push_str(".tif");
				path
			}
			_ => format!("{}_{slab_x}_{slab_y}", self.config.prefix),
		}
	}

	/// Index of tile `(x, y)` inside its slab.
	fn tile_index_in_slab(&self, tile_x: i64, tile_y: i64) -> usize {
		let column = euclidean_rem(tile_x, i64::from(self.config.tiles_per_width));
		let row = euclidean_rem(tile_y, i64::from(self.config.tiles_per_height));
		(row * i64::from(self.config.tiles_per_width) + column) as usize
	}

	fn in_tile_window(&self, tile_x: i64, tile_y: i64) -> bool {
		tile_x >= i64::from(self.config.min_tile_col)
			&& tile_x <= i64::from(self.config.max_tile_col)
			&& tile_y >= i64::from(self.config.min_tile_row)
			&& tile_y <= i64::from(self.config.max_tile_row)
	}

	/// The reader of the named slab, opened once and memorized for the
	/// handle's lifetime. Missing slabs are not cached, so they become
	/// visible as soon as they appear.
	fn slab_reader(&mut self, name: &str) -> Result<Option<&mut SlabReader>> {
		let cached = self.cached_slab.as_ref().is_some_and(|(cached_name, _)| cached_name == name);
		if !cached {
			let Some(reader) = SlabReader::open(SharedStorage::clone(&self.storage), name)
				.with_context(|| format!("cannot open slab '{name}'"))?
			else {
				return Ok(None);
			};
			self.cached_slab = Some((name.to_owned(), reader));
		}
		Ok(self.cached_slab.as_mut().map(|(_, reader)| reader))
	}

	/// Returns the encoded payload of tile `(x, y)`, wrapped in a minimal
	/// TIFF envelope unless the compression is self-describing.
	pub fn get_tile(&mut self, tile_x: i64, tile_y: i64) -> Result<Blob, FetchError> {
		if !self.in_tile_window(tile_x, tile_y) {
			return Err(FetchError::TileNotFound);
		}

		let name = self.slab_name(tile_x, tile_y);
		let index = self.tile_index_in_slab(tile_x, tile_y);
		let format = self.config.format;
		let tile_width = self.config.tile_matrix.tile_width();
		let tile_height = self.config.tile_matrix.tile_height();

		let Some(reader) = self.slab_reader(&name)? else {
			return Err(FetchError::TileNotFound);
		};
		let payload = reader.encoded_tile(index)?;
		if payload.is_empty() {
			return Err(FetchError::TileNotFound);
		}

		if format.compression.is_self_describing() {
			Ok(payload)
		} else {
			Ok(tiff_envelope(payload.as_slice(), &format, tile_width, tile_height)?)
		}
	}

	/// Terrain bbox of tile `(x, y)` cropped by the margins.
	fn cropped_tile_bbox(&self, tile_x: i64, tile_y: i64, margins: (u32, u32, u32, u32)) -> BoundingBox {
		let (left, top, right, bottom) = margins;
		let tm = &self.config.tile_matrix;
		let res = tm.resolution();
		let tile_width = i64::from(tm.tile_width());
		let tile_height = i64::from(tm.tile_height());

		BoundingBox::new(
			tm.x0() + (tile_x * tile_width + i64::from(left)) as f64 * res,
			tm.y0() - ((tile_y + 1) * tile_height - i64::from(bottom)) as f64 * res,
			tm.x0() + ((tile_x + 1) * tile_width - i64::from(right)) as f64 * res,
			tm.y0() - (tile_y * tile_height + i64::from(top)) as f64 * res,
		)
	}

	/// Lazy image over tile `(x, y)`, cropped by the per-edge margins.
	///
	/// Anything that denies the tile (outside the valid window, missing
	/// slab, empty index entry, decode failure) degrades to a nodata image
	/// of the same shape.
	pub fn get_tile_image(&mut self, tile_x: i64, tile_y: i64, margins: (u32, u32, u32, u32)) -> Result<BoxImage> {
		let (left, top, right, bottom) = margins;
		let tm = &self.config.tile_matrix;
		let width = tm.tile_width() - left - right;
		let height = tm.tile_height() - top - bottom;
		let bbox = self.cropped_tile_bbox(tile_x, tile_y, margins);
		let nodata = self.config.nodata.clone();

		let empty = |bbox| -> BoxImage { Box::new(EmptyImage::new(width, height, nodata.clone(), bbox)) };

		if !self.in_tile_window(tile_x, tile_y) {
			return Ok(empty(bbox));
		}

		let name = self.slab_name(tile_x, tile_y);
		let index = self.tile_index_in_slab(tile_x, tile_y);
		let format = self.config.format;
		let tile_width = tm.tile_width();
		let tile_height = tm.tile_height();
		let level_id = self.id().to_owned();

		let Some(reader) = self.slab_reader(&name)? else {
			return Ok(empty(bbox));
		};

		match reader.raw_tile(index) {
			Ok(data) => {
				let data = data.to_vec();
				Ok(Box::new(RawImage::new(
					data,
					format.sample_format,
					format.bits_per_sample,
					tile_width,
					tile_height,
					format.channels,
					bbox,
					margins,
				)))
			}
			Err(e) => {
				warn!("tile ({tile_x},{tile_y}) of level '{level_id}' degrades to nodata: {e}");
				Ok(empty(bbox))
			}
		}
	}

	/// Assembles the pixel window `[x_min, x_max) x [y_min, y_max)` (level
	/// pixel coordinates) from its tiles.
	fn get_window(&mut self, limits: &RequestLimits, window: PixelWindow) -> Result<BoxImage, FetchError> {
		let tile_width = i64::from(self.config.tile_matrix.tile_width());
		let tile_height = i64::from(self.config.tile_matrix.tile_height());

		let tile_x_min = euclidean_div(window.x_min, tile_width);
		let tile_x_max = euclidean_div(window.x_max - 1, tile_width);
		let tile_y_min = euclidean_div(window.y_min, tile_height);
		let tile_y_max = euclidean_div(window.y_max - 1, tile_height);

		if tile_x_max < tile_x_min || tile_y_max < tile_y_min {
			return Err(FetchError::EmptyWindow);
		}
		let tiles_x = (tile_x_max - tile_x_min + 1) as u32;
		let tiles_y = (tile_y_max - tile_y_min + 1) as u32;
		if tiles_x > limits.max_tiles_x || tiles_y > limits.max_tiles_y {
			return Err(FetchError::TooManyTiles {
				tiles_x,
				tiles_y,
				max_x: limits.max_tiles_x,
				max_y: limits.max_tiles_y,
			});
		}

		// outer tiles are cropped down to the window edges
		let mut left = vec![0u32; tiles_x as usize];
		let mut right = vec![0u32; tiles_x as usize];
		let mut top = vec![0u32; tiles_y as usize];
		let mut bottom = vec![0u32; tiles_y as usize];
		left[0] = euclidean_rem(window.x_min, tile_width) as u32;
		right[tiles_x as usize - 1] = (tile_width - euclidean_rem(window.x_max - 1, tile_width) - 1) as u32;
		top[0] = euclidean_rem(window.y_min, tile_height) as u32;
		bottom[tiles_y as usize - 1] = (tile_height - euclidean_rem(window.y_max - 1, tile_height) - 1) as u32;

		let mut rows: Vec<Vec<BoxImage>> = Vec::with_capacity(tiles_y as usize);
		for y in 0..tiles_y as i64 {
			let mut row: Vec<BoxImage> = Vec::with_capacity(tiles_x as usize);
			for x in 0..tiles_x as i64 {
				row.push(self.get_tile_image(
					tile_x_min + x,
					tile_y_min + y,
					(
						left[x as usize],
						top[y as usize],
						right[x as usize],
						bottom[y as usize],
					),
				)?);
			}
			rows.push(row);
		}

		if tiles_x == 1 && tiles_y == 1 {
			Ok(rows.remove(0).remove(0))
		} else {
			Ok(CompoundImage::new(rows).map(|compound| Box::new(compound) as BoxImage)?)
		}
	}

	/// Same-CRS window fetch: composites, crops and resamples the level's
	/// tiles into a `width`x`height` raster over `bbox`.
	pub fn get_bbox(
		&mut self,
		limits: &RequestLimits,
		bbox: BoundingBox,
		width: u32,
		height: u32,
		kernel_type: KernelType,
	) -> Result<BoxImage, FetchError> {
		let tm = &self.config.tile_matrix;
		let res = tm.resolution();

		// the request in level pixel coordinates
		let px_x_min = (bbox.x_min - tm.x0()) / res;
		let px_x_max = (bbox.x_max - tm.x0()) / res;
		let px_y_min = (tm.y0() - bbox.y_max) / res;
		let px_y_max = (tm.y0() - bbox.y_min) / res;

		let window = PixelWindow {
			x_min: (px_x_min + EPS).floor() as i64,
			y_min: (px_y_min + EPS).floor() as i64,
			x_max: (px_x_max - EPS).ceil() as i64,
			y_max: (px_y_max - EPS).ceil() as i64,
		};

		// in-phase, pixel-exact requests skip resampling entirely
		if window.x_max - window.x_min == i64::from(width)
			&& window.y_max - window.y_min == i64::from(height)
			&& px_x_min - (window.x_min as f64) < EPS
			&& (window.x_max as f64) - px_x_max < EPS
			&& px_y_min - (window.y_min as f64) < EPS
			&& (window.y_max as f64) - px_y_max < EPS
		{
			debug!("pixel-exact request on level '{}', no resampling", self.id());
			return self.get_window(limits, window);
		}

		let ratio_x = (px_x_max - px_x_min) / f64::from(width);
		let ratio_y = (px_y_max - px_y_min) / f64::from(height);

		let kernel_type = kernel_type.for_resampling();
		let kernel = Kernel::get(kernel_type);

		// a kernel-sized halo keeps the resampling free of edge effects
		let window = PixelWindow {
			x_min: (px_x_min - kernel.support(ratio_x)).floor() as i64,
			x_max: (px_x_max + kernel.support(ratio_x)).ceil() as i64,
			y_min: (px_y_min - kernel.support(ratio_y)).floor() as i64,
			y_max: (px_y_max + kernel.support(ratio_y)).ceil() as i64,
		};

		let source = self.get_window(limits, window)?;
		let resampled = ResampledImage::new(source, width, height, bbox, kernel_type, false)?;
		Ok(Box::new(resampled))
	}

	/// Reprojecting window fetch: `bbox` is expressed in `dst_crs`, the
	/// level's data in `src_crs`.
	#[allow(clippy::too_many_arguments)]
	pub fn get_bbox_reprojected(
		&mut self,
		limits: &RequestLimits,
		bbox: BoundingBox,
		width: u32,
		height: u32,
		src_crs: Crs,
		dst_crs: Crs,
		kernel_type: KernelType,
	) -> Result<BoxImage, FetchError> {
		let tm = &self.config.tile_matrix;
		let res = tm.resolution();

		// backward map of the output raster; NaN anywhere means the source
		// CRS does not cover the request
		let mut grid =
			Grid::compute(width, height, bbox, dst_crs, src_crs).map_err(FetchError::OutsideProjection)?;
		let source_bbox = grid.bbox();

		let kernel_type = kernel_type.for_reprojection();
		let kernel = Kernel::get(kernel_type);

		let ratio_x = source_bbox.width() / (res * f64::from(width));
		let ratio_y = source_bbox.height() / (res * f64::from(height));

		// generous padding preserves quality under large scale changes
		let padding_x = kernel.support(ratio_x).max(REPROJECTION_PADDING);
		let padding_y = kernel.support(ratio_y).max(REPROJECTION_PADDING);

		let window = PixelWindow {
			x_min: ((source_bbox.x_min - tm.x0()) / res - padding_x).floor() as i64,
			y_min: ((tm.y0() - source_bbox.y_max) / res - padding_y).floor() as i64,
			x_max: ((source_bbox.x_max - tm.x0()) / res + padding_x).ceil() as i64,
			y_max: ((tm.y0() - source_bbox.y_min) / res + padding_y).ceil() as i64,
		};

		let source = self.get_window(limits, window)?;

		// terrain coordinates to source pixel-center coordinates
		let source_geometry = source.bbox();
		grid.affine_transform(
			1.0 / source.res_x(),
			-source_geometry.x_min / source.res_x() - 0.5,
			-1.0 / source.res_y(),
			source_geometry.y_max / source.res_y() - 0.5,
		);

		let reprojected = ReprojectedImage::new(source, bbox, grid, kernel_type, ratio_x, ratio_y)?;
		Ok(Box::new(reprojected))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use slabtiles_core::storage::FileStorage;
	use slabtiles_core::{Compression, Photometric, SampleFormat};
	use std::sync::Arc;

	fn level_config() -> LevelConfig {
		LevelConfig {
			tile_matrix: TileMatrix::new("11", 2.0, 0.0, 1024.0, 16, 16, 32, 32).unwrap(),
			format: PixelFormat::new(SampleFormat::UInt, 8, 3, Photometric::Rgb, Compression::None).unwrap(),
			tiles_per_width: 4,
			tiles_per_height: 4,
			min_tile_col: 0,
			max_tile_col: 31,
			min_tile_row: 0,
			max_tile_row: 31,
			nodata: vec![255.0, 0.0, 0.0],
			root: "PYRAMID/11".to_owned(),
			path_depth: 2,
			prefix: "PYRAMID_11".to_owned(),
		}
	}

	fn file_level() -> (assert_fs::TempDir, Level) {
		let dir = assert_fs::TempDir::new().unwrap();
		let storage: SharedStorage = Arc::new(FileStorage::new(dir.path()));
		(dir, Level::new(level_config(), storage).unwrap())
	}

	#[test]
	fn filesystem_paths_use_base36_pairs() {
		let (_dir, level) = file_level();
		// tile (5, 9) -> slab (1, 2): digits 00/00/12
		assert_eq!(level.slab_name(5, 9), "PYRAMID/11/00/00/12.tif");
		// slab indices (37, 1) = (11, 01) in base 36
		assert_eq!(level.slab_name(37 * 4, 1 * 4), "PYRAMID/11/00/10/11.tif");
	}

	#[test]
	fn object_names_use_decimal_indices() {
		let storage: SharedStorage = Arc::new(
			slabtiles_core::storage::S3Storage::new(slabtiles_core::storage::S3Config {
				url: "http://localhost:9000".to_owned(),
				key: "KEY".to_owned(),
				secret_key: "SECRETKEY".to_owned(),
				bucket: "pyramids".to_owned(),
				read_attempts: 3,
				ssl_no_verify: false,
			})
			.unwrap(),
		);
		let level = Level::new(level_config(), storage).unwrap();
		// tile (5, 9) -> slab (1, 2)
		assert_eq!(level.slab_name(5, 9), "PYRAMID_11_1_2");
	}

	#[test]
	fn tile_index_in_slab_is_row_major() {
		let (_dir, level) = file_level();
		assert_eq!(level.tile_index_in_slab(5, 9), 5);
		assert_eq!(level.tile_index_in_slab(4, 8), 0);
		assert_eq!(level.tile_index_in_slab(7, 11), 15);
	}

	#[test]
	fn extent_covers_the_tile_window() {
		let (_dir, level) = file_level();
		let extent = level.extent();
		// 32x32 tiles of 16px at res 2, origin (0, 1024)
		assert_eq!(
			(extent.x_min, extent.y_min, extent.x_max, extent.y_max),
			(0.0, 0.0, 1024.0, 1024.0)
		);
	}

	#[test]
	fn slab_bbox_covers_its_tiles() {
		let (_dir, level) = file_level();
		// tile (5, 9) -> slab (1, 2); slabs are 4x4 tiles of 16px at res 2
		let bbox = level.slab_bbox(5, 9);
		assert_eq!(
			(bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max),
			(128.0, 640.0, 256.0, 768.0)
		);
		// every tile of the slab sits inside
		assert!(bbox.contains(&level.cropped_tile_bbox(5, 9, (0, 0, 0, 0))));
	}

	#[test]
	fn cropped_tile_bbox_accounts_for_margins() {
		let (_dir, level) = file_level();
		let bbox = level.cropped_tile_bbox(1, 1, (2, 3, 4, 5));
		// tile (1,1) spans x 32..64, y 960..992 at res 2
		assert_eq!(bbox.x_min, 32.0 + 4.0);
		assert_eq!(bbox.x_max, 64.0 - 8.0);
		assert_eq!(bbox.y_max, 992.0 - 6.0);
		assert_eq!(bbox.y_min, 960.0 + 10.0);
	}

	#[test]
	fn missing_tiles_are_nodata_images() {
		let (_dir, mut level) = file_level();
		let mut image = level.get_tile_image(3, 3, (0, 0, 0, 0)).unwrap();
		assert_eq!(image.width(), 16);
		assert_eq!(image.height(), 16);

		let mut buffer = vec![0u8; 16 * 3];
		image.get_line_u8(0, &mut buffer);
		assert_eq!(&buffer[..6], &[255, 0, 0, 255, 0, 0]);
	}

	#[test]
	fn out_of_window_tiles_are_nodata_and_errors() {
		let (_dir, mut level) = file_level();
		// the image path degrades to nodata
		let image = level.get_tile_image(64, 64, (0, 0, 0, 0)).unwrap();
		assert_eq!(image.width(), 16);
		// the encoded path is a domain error
		assert!(matches!(level.get_tile(64, 64), Err(FetchError::TileNotFound)));
	}

	#[test]
	fn oversized_windows_are_rejected() {
		let (_dir, mut level) = file_level();
		let limits = RequestLimits::new(2, 2);
		let window = PixelWindow {
			x_min: 0,
			y_min: 0,
			x_max: 16 * 3,
			y_max: 16,
		};
		assert!(matches!(
			level.get_window(&limits, window),
			Err(FetchError::TooManyTiles { tiles_x: 3, .. })
		));
	}
}
