//! End-to-end fetch scenarios over filesystem-backed pyramids.

use slabtiles_core::storage::{FileStorage, SharedStorage, Storage, StorageError, StorageType};
use slabtiles_core::{Blob, BoundingBox, Compression, Crs, Photometric, PixelFormat, SampleFormat, TileMatrix};
use slabtiles_pyramid::{FetchError, Level, LevelConfig, RequestLimits};
use slabtiles_raster::Image;
use slabtiles_slab::{SlabReader, SlabWriter};
use std::sync::{Arc, Mutex};

const GREEN: [u8; 3] = [0, 255, 0];
const RED_NODATA: [f32; 3] = [255.0, 0.0, 0.0];

fn rgb_none() -> PixelFormat {
	PixelFormat::new(SampleFormat::UInt, 8, 3, Photometric::Rgb, Compression::None).unwrap()
}

/// Writes a single-tile slab filled with one colour.
fn write_flat_slab(storage: &SharedStorage, name: &str, size: u32, colour: [u8; 3]) {
	let mut writer = SlabWriter::new(SharedStorage::clone(storage), name, rgb_none(), size, size, size, size).unwrap();
	let tile: Vec<u8> = colour.iter().copied().cycle().take((size * size * 3) as usize).collect();
	writer.write_header().unwrap();
	writer.write_tile(0, &tile, false).unwrap();
	writer.finalize().unwrap();
}

fn file_storage() -> (assert_fs::TempDir, SharedStorage) {
	let dir = assert_fs::TempDir::new().unwrap();
	let storage: SharedStorage = Arc::new(FileStorage::new(dir.path()));
	(dir, storage)
}

/// Scenario: single-tile slab, raw uint8 256x256 RGB, nodata (255,0,0).
#[test]
fn single_tile_slab_and_virtual_tile() {
	let (_dir, storage) = file_storage();

	let config = LevelConfig {
		tile_matrix: TileMatrix::new("0", 1.0, 0.0, 1024.0, 256, 256, 4, 4).unwrap(),
		format: rgb_none(),
		tiles_per_width: 1,
		tiles_per_height: 1,
		min_tile_col: 0,
		max_tile_col: 3,
		min_tile_row: 0,
		max_tile_row: 3,
		nodata: RED_NODATA.to_vec(),
		root: "LEVEL0".to_owned(),
		path_depth: 2,
		prefix: "LEVEL0".to_owned(),
	};
	let mut level = Level::new(config, SharedStorage::clone(&storage)).unwrap();

	write_flat_slab(&storage, &level.slab_name(0, 0), 256, GREEN);

	// the stored tile comes back all green
	let mut image = level.get_tile_image(0, 0, (0, 0, 0, 0)).unwrap();
	assert_eq!((image.width(), image.height()), (256, 256));
	let mut line = vec![0u8; 256 * 3];
	for line_index in [0i64, 100, 255] {
		assert_eq!(image.get_line_u8(line_index, &mut line), 256 * 3);
		for pixel in line.chunks(3) {
			assert_eq!(pixel, &GREEN);
		}
	}

	// a virtual tile outside the level's window is nodata
	let mut virtual_tile = level.get_tile_image(5, 5, (0, 0, 0, 0)).unwrap();
	assert_eq!((virtual_tile.width(), virtual_tile.height()), (256, 256));
	virtual_tile.get_line_u8(128, &mut line);
	for pixel in line.chunks(3) {
		assert_eq!(pixel, &[255, 0, 0]);
	}

	// the encoded path serves a TIFF envelope around the raw payload
	let encoded = level.get_tile(0, 0).unwrap();
	assert_eq!(&encoded.as_slice()[0..2], b"II");
	assert!(encoded.len() > 256 * 256 * 3);
}

/// Builds a level whose slabs are flat-coloured single-tile slabs of 64px.
fn flat_level(storage: &SharedStorage, id: &str, resolution: f64, matrix_size: u32, colour: [u8; 3]) -> Level {
	let config = LevelConfig {
		tile_matrix: TileMatrix::new(id, resolution, 0.0, 1024.0, 64, 64, matrix_size, matrix_size).unwrap(),
		format: rgb_none(),
		tiles_per_width: 1,
		tiles_per_height: 1,
		min_tile_col: 0,
		max_tile_col: matrix_size - 1,
		min_tile_row: 0,
		max_tile_row: matrix_size - 1,
		nodata: RED_NODATA.to_vec(),
		root: format!("LEVEL{id}"),
		path_depth: 2,
		prefix: format!("LEVEL{id}"),
	};
	let level = Level::new(config, SharedStorage::clone(storage)).unwrap();
	for y in 0..matrix_size {
		for x in 0..matrix_size {
			write_flat_slab(storage, &level.slab_name(i64::from(x), i64::from(y)), 64, colour);
		}
	}
	level
}

/// Scenario: three-level pyramid, same-CRS window fetch at a resolution
/// between two levels; the Lanczos weights sum to one, so flat data stays
/// flat through the resampling.
#[test]
fn same_crs_window_fetch_resamples() {
	let (_dir, storage) = file_storage();

	// levels at resolutions 1, 2 and 4; the request lands on level "2"
	let mut fine = flat_level(&storage, "2", 1.0, 16, [100, 150, 200]);
	let _middle = flat_level(&storage, "1", 2.0, 8, [0, 0, 0]);
	let _coarse = flat_level(&storage, "0", 4.0, 4, [0, 0, 0]);

	let limits = RequestLimits::default();
	// 512x512 output at resolution 1.5 over a window interior to the level
	let bbox = BoundingBox::new(100.0, 1024.0 - 100.0 - 768.0, 868.0, 924.0);
	let mut image = fine
		.get_bbox(&limits, bbox, 512, 512, slabtiles_raster::KernelType::Lanczos2)
		.unwrap();

	assert_eq!((image.width(), image.height()), (512, 512));
	assert_eq!(image.res_x(), 1.5);

	let mut line = vec![0u8; 512 * 3];
	for line_index in [0i64, 17, 255, 511] {
		assert_eq!(image.get_line_u8(line_index, &mut line), 512 * 3);
		for pixel in line.chunks(3) {
			assert_eq!(pixel, &[100, 150, 200]);
		}
	}
}

/// Scenario: pixel-exact in-phase requests bypass resampling.
#[test]
fn in_phase_window_fetch_is_exact() {
	let (_dir, storage) = file_storage();
	let mut level = flat_level(&storage, "2", 1.0, 16, [10, 20, 30]);

	let limits = RequestLimits::default();
	let bbox = BoundingBox::new(64.0, 1024.0 - 64.0 - 128.0, 192.0, 960.0);
	let mut image = level
		.get_bbox(&limits, bbox, 128, 128, slabtiles_raster::KernelType::Lanczos2)
		.unwrap();

	assert_eq!((image.width(), image.height()), (128, 128));
	let mut line = vec![0u8; 128 * 3];
	image.get_line_u8(5, &mut line);
	for pixel in line.chunks(3) {
		assert_eq!(pixel, &[10, 20, 30]);
	}
}

/// Scenario: reprojection from EPSG:3857 to EPSG:4326 across the
/// antimeridian; the eastern half of the request has no source data.
#[test]
fn reprojection_across_the_antimeridian() {
	let (_dir, storage) = file_storage();

	// one tile column ending exactly at the antimeridian
	let antimeridian = 20_037_508.342_789_244;
	let resolution = 1000.0;
	let x0 = antimeridian - 64.0 * resolution;

	let config = LevelConfig {
		tile_matrix: TileMatrix::new("7", resolution, x0, 128_000.0, 64, 64, 1, 4).unwrap(),
		format: rgb_none(),
		tiles_per_width: 1,
		tiles_per_height: 1,
		min_tile_col: 0,
		max_tile_col: 0,
		min_tile_row: 0,
		max_tile_row: 3,
		nodata: RED_NODATA.to_vec(),
		root: "LEVEL7".to_owned(),
		path_depth: 2,
		prefix: "LEVEL7".to_owned(),
	};
	let mut level = Level::new(config, SharedStorage::clone(&storage)).unwrap();
	for row in 0..4 {
		write_flat_slab(&storage, &level.slab_name(0, row), 64, GREEN);
	}

	let limits = RequestLimits::default();
	let bbox = BoundingBox::new(179.5, -1.0, 180.5, 1.0);
	let mut image = level
		.get_bbox_reprojected(
			&limits,
			bbox,
			64,
			64,
			Crs::Epsg3857,
			Crs::Epsg4326,
			slabtiles_raster::KernelType::Lanczos3,
		)
		.unwrap();

	assert_eq!((image.width(), image.height()), (64, 64));

	// the antimeridian sits at output column 32: green to the west, nodata
	// to the east, within one pixel of kernel blur
	let mut line = vec![0u8; 64 * 3];
	image.get_line_u8(32, &mut line);

	let green_count = line
		.chunks(3)
		.take_while(|pixel| pixel[1] > 200 && pixel[0] < 50)
		.count();
	assert!(
		(30..=34).contains(&green_count),
		"expected the data to end around column 32, got {green_count}"
	);

	let west = &line[16 * 3..16 * 3 + 3];
	assert!(west[1] > 240 && west[0] < 10, "west pixel should be green: {west:?}");
	let east = &line[48 * 3..48 * 3 + 3];
	assert!(east[0] > 240 && east[1] < 10, "east pixel should be nodata red: {east:?}");
}

/// Scenario: a symbolic slab chain is transparent to tile fetches.
#[test]
fn symbolic_slab_chain_is_transparent() {
	let (_dir, storage) = file_storage();

	let config = LevelConfig {
		tile_matrix: TileMatrix::new("3", 1.0, 0.0, 1024.0, 64, 64, 4, 4).unwrap(),
		format: rgb_none(),
		tiles_per_width: 1,
		tiles_per_height: 1,
		min_tile_col: 0,
		max_tile_col: 3,
		min_tile_row: 0,
		max_tile_row: 3,
		nodata: RED_NODATA.to_vec(),
		root: "LEVEL3".to_owned(),
		path_depth: 2,
		prefix: "LEVEL3".to_owned(),
	};
	let mut level = Level::new(config, SharedStorage::clone(&storage)).unwrap();

	// the real pixels live under another name; the level path is a link
	write_flat_slab(&storage, "ARCHIVE/real_slab.tif", 64, GREEN);
	let mut link = slabtiles_slab::SLAB_LINK_SIGNATURE.to_vec();
	link.extend_from_slice(b"ARCHIVE/real_slab.tif");
	let link_name = level.slab_name(0, 0);
	storage.open_to_write(&link_name).unwrap();
	storage.write_full(&link, &link_name).unwrap();
	storage.close_to_write(&link_name).unwrap();

	// fetching through the level resolves the indirection
	let through_level = level.get_tile(0, 0).unwrap();
	let direct = SlabReader::open(SharedStorage::clone(&storage), "ARCHIVE/real_slab.tif")
		.unwrap()
		.unwrap();
	let direct_payload = direct.encoded_tile(0).unwrap();
	// the envelope wraps the exact payload bytes of the target slab
	let envelope_length = through_level.len() as usize - direct_payload.len() as usize;
	assert_eq!(
		&through_level.as_slice()[envelope_length..],
		direct_payload.as_slice()
	);

	// and the original name never shows up in the payload
	let needle = link_name.as_bytes();
	let haystack = through_level.as_slice();
	assert!(!haystack.windows(needle.len()).any(|window| window == needle));
}

/// A storage that times out on the first read of every object, then behaves.
#[derive(Debug)]
struct FlakyOnce {
	inner: FileStorage,
	failed: Mutex<Vec<String>>,
	retries_seen: Mutex<u32>,
}

impl Storage for FlakyOnce {
	fn storage_type(&self) -> StorageType {
		StorageType::File
	}
	fn tray(&self) -> &str {
		self.inner.tray()
	}
	fn read(&self, offset: u64, size: u64, name: &str) -> Result<Blob, StorageError> {
		let mut failed = self.failed.lock().unwrap();
		if !failed.iter().any(|n| n == name) {
			failed.push(name.to_owned());
			*self.retries_seen.lock().unwrap() += 1;
			return Err(StorageError::Transient {
				name: name.to_owned(),
				message: "injected timeout".to_owned(),
			});
		}
		self.inner.read(offset, size, name)
	}
	fn exists(&self, name: &str) -> bool {
		self.inner.exists(name)
	}
	fn read_attempts(&self) -> u32 {
		3
	}
	fn open_to_write(&self, name: &str) -> Result<(), StorageError> {
		self.inner.open_to_write(name)
	}
	fn write(&self, data: &[u8], offset: u64, name: &str) -> Result<(), StorageError> {
		self.inner.write(data, offset, name)
	}
	fn write_full(&self, data: &[u8], name: &str) -> Result<(), StorageError> {
		self.inner.write_full(data, name)
	}
	fn close_to_write(&self, name: &str) -> Result<(), StorageError> {
		self.inner.close_to_write(name)
	}
}

/// Scenario: a transient storage timeout is retried and the request comes
/// back identical to the non-failing case.
#[test]
fn transient_failures_are_retried_once() {
	let dir = assert_fs::TempDir::new().unwrap();
	let flaky = Arc::new(FlakyOnce {
		inner: FileStorage::new(dir.path()),
		failed: Mutex::new(Vec::new()),
		retries_seen: Mutex::new(0),
	});
	let storage: SharedStorage = Arc::<FlakyOnce>::clone(&flaky);

	let config = LevelConfig {
		tile_matrix: TileMatrix::new("5", 1.0, 0.0, 1024.0, 64, 64, 4, 4).unwrap(),
		format: rgb_none(),
		tiles_per_width: 1,
		tiles_per_height: 1,
		min_tile_col: 0,
		max_tile_col: 3,
		min_tile_row: 0,
		max_tile_row: 3,
		nodata: RED_NODATA.to_vec(),
		root: "LEVEL5".to_owned(),
		path_depth: 2,
		prefix: "LEVEL5".to_owned(),
	};
	let mut level = Level::new(config, storage).unwrap();

	let shared: SharedStorage = Arc::<FlakyOnce>::clone(&flaky);
	write_flat_slab(&shared, &level.slab_name(0, 0), 64, GREEN);

	let mut image = level.get_tile_image(0, 0, (0, 0, 0, 0)).unwrap();
	let mut line = vec![0u8; 64 * 3];
	image.get_line_u8(0, &mut line);
	for pixel in line.chunks(3) {
		assert_eq!(pixel, &GREEN);
	}

	// the header read failed once and was retried, nothing else
	assert_eq!(*flaky.retries_seen.lock().unwrap(), 1);
}

/// Scenario: request-shape violations surface as domain errors, not nodata.
#[test]
fn oversized_requests_are_domain_errors() {
	let (_dir, storage) = file_storage();
	let mut level = flat_level(&storage, "2", 1.0, 16, GREEN);

	let limits = RequestLimits::new(2, 2);
	let bbox = BoundingBox::new(0.0, 0.0, 1024.0, 1024.0);
	let result = level.get_bbox(&limits, bbox, 1024, 1024, slabtiles_raster::KernelType::Linear);
	assert!(matches!(result, Err(FetchError::TooManyTiles { .. })));
}
