//! This module provides the [`SlabWriter`], which builds a slab object:
//! header, encoded tiles aligned to 16 bytes, then the finalized tile index.

use super::header::{SLAB_HEADER_SIZE, SlabHeader};
use super::tile_index::TileIndex;
use crate::codec;
use anyhow::{Context, Result, bail, ensure};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};
use slabtiles_core::storage::{SharedStorage, Storage};
use slabtiles_core::{Compression, Photometric, PixelFormat, SampleFormat};
use std::path::Path;

/// Square block size used by the JPEG crop-white pass.
const JPEG_BLOCK_SIZE: usize = 16;

/// Byte offset of the TileByteCounts tag value, patched for 1-tile slabs.
const BYTE_COUNTS_VALUE_OFFSET: u64 = 134;

/// Writer for one slab object.
///
/// Call [`write_header`](SlabWriter::write_header) first, then
/// [`write_tile`](SlabWriter::write_tile) for every tile in row-major order,
/// then [`finalize`](SlabWriter::finalize).
pub struct SlabWriter {
	storage: SharedStorage,
	name: String,
	header: Option<SlabHeader>,
	tiles_per_width: u32,
	tiles_per_height: u32,
	index: TileIndex,
	position: u64,
}

impl SlabWriter {
	/// Creates a raster slab writer.
	pub fn new(
		storage: SharedStorage,
		name: &str,
		mut format: PixelFormat,
		width: u32,
		height: u32,
		tile_width: u32,
		tile_height: u32,
	) -> Result<SlabWriter> {
		ensure!(
			tile_width > 0 && tile_height > 0 && width % tile_width == 0 && height % tile_height == 0,
			"slab dimensions have to be a multiple of the tile dimensions"
		);

		if format.compression == Compression::Jpeg {
			ensure!(
				format.photometric != Photometric::Gray,
				"gray JPEG slabs are not handled"
			);
			ensure!(
				format.sample_format == SampleFormat::UInt && format.bits_per_sample == 8,
				"JPEG compression only handles 8-bit integer samples"
			);
			if format.photometric == Photometric::Rgb {
				format.photometric = Photometric::Ycbcr;
			}
		} else if format.photometric == Photometric::Ycbcr {
			format.photometric = Photometric::Rgb;
		}
		format.validate()?;

		let header = SlabHeader {
			width,
			height,
			tile_width,
			tile_height,
			format,
		};
		let tiles_per_width = header.tiles_per_width();
		let tiles_per_height = header.tiles_per_height();
		let tiles_number = header.tiles_number();

		Ok(SlabWriter {
			storage,
			name: name.to_owned(),
			header: Some(header),
			tiles_per_width,
			tiles_per_height,
			index: TileIndex::new_empty(tiles_number as usize),
			position: SLAB_HEADER_SIZE as u64 + 8 * u64::from(tiles_number),
		})
	}

	/// Creates a vector slab writer: same layout, `.pbf` payloads.
	pub fn new_vector(
		storage: SharedStorage,
		name: &str,
		tiles_per_width: u32,
		tiles_per_height: u32,
	) -> Result<SlabWriter> {
		ensure!(
			tiles_per_width > 0 && tiles_per_height > 0,
			"slab tiling must be at least 1x1"
		);
		let tiles_number = tiles_per_width * tiles_per_height;
		Ok(SlabWriter {
			storage,
			name: name.to_owned(),
			header: None,
			tiles_per_width,
			tiles_per_height,
			index: TileIndex::new_empty(tiles_number as usize),
			position: SLAB_HEADER_SIZE as u64 + 8 * u64::from(tiles_number),
		})
	}

	fn tiles_number(&self) -> u32 {
		self.tiles_per_width * self.tiles_per_height
	}

	/// Opens the object and writes the 2048-byte header block.
	pub fn write_header(&mut self) -> Result<()> {
		self
			.storage
			.open_to_write(&self.name)
			.with_context(|| format!("unable to open output '{}'", self.name))?;

		let header = match &self.header {
			Some(header) => header.build(),
			None => SlabHeader::build_vector(self.tiles_per_width, self.tiles_per_height),
		};
		self
			.storage
			.write(header.as_slice(), 0, &self.name)
			.with_context(|| format!("cannot write the slab header for '{}'", self.name))?;
		Ok(())
	}

	fn append_payload(&mut self, tile: usize, payload: &[u8]) -> Result<()> {
		if self.tiles_number() == 1 {
			// the TileByteCounts tag value holds the size directly
			let mut size = [0u8; 4];
			LittleEndian::write_u32(&mut size, payload.len() as u32);
			self
				.storage
				.write(&size, BYTE_COUNTS_VALUE_OFFSET, &self.name)
				.with_context(|| format!("cannot patch the inline tile size for '{}'", self.name))?;
		}

		self.index.set(tile, self.position as u32, payload.len() as u32);
		self
			.storage
			.write(payload, self.position, &self.name)
			.with_context(|| format!("cannot write tile {tile} for slab '{}'", self.name))?;

		// payloads stay 16-byte aligned
		self.position = (self.position + payload.len() as u64 + 15) & !15;
		Ok(())
	}

	/// Encodes and writes one raster tile from raw samples.
	///
	/// `crop` whitens every 16x16 block containing a pure-white pixel before
	/// JPEG encoding, so block edges stay clean; it is ignored for other
	/// compressions.
	pub fn write_tile(&mut self, tile: usize, data: &[u8], mut crop: bool) -> Result<()> {
		let header = match &self.header {
			Some(header) => header.clone(),
			None => bail!("raster tiles cannot be written into a vector slab"),
		};
		ensure!(
			tile < self.tiles_number() as usize,
			"invalid tile index {tile} to write, the slab holds {} tiles",
			self.tiles_number()
		);
		ensure!(
			data.len() == header.raw_tile_size(),
			"raw tile is {} bytes, expected {}",
			data.len(),
			header.raw_tile_size()
		);

		if crop && header.format.compression != Compression::Jpeg {
			warn!("the crop option is reserved for JPEG compression");
			crop = false;
		}

		let mut data = data.to_vec();
		if crop {
			let line_size = header.raw_tile_line_size();
			let channels = header.format.channels as usize;
			for band in data.chunks_mut(JPEG_BLOCK_SIZE * line_size) {
				let lines = band.len() / line_size;
				empty_white_block(band, lines, line_size, channels);
			}
		}

		let payload = codec::encode_tile(
			header.format.compression,
			&data,
			header.raw_tile_line_size(),
			header.tile_width,
			header.tile_height,
			header.format.channels,
		)?;
		self.append_payload(tile, &payload)
	}

	/// Packs pre-encoded `.pbf` tiles from `root_dir/{col}/{row}.pbf` into a
	/// vector slab; `ul_tile_col`/`ul_tile_row` are the indices of the
	/// slab's upper-left tile. A missing tile file leaves an empty entry.
	pub fn write_pbf_tiles(&mut self, root_dir: &Path, ul_tile_col: u32, ul_tile_row: u32) -> Result<()> {
		ensure!(self.header.is_none(), "PBF tiles can only be written into a vector slab");

		for row in 0..self.tiles_per_height {
			for column in 0..self.tiles_per_width {
				let tile = (row * self.tiles_per_width + column) as usize;
				let path = root_dir
					.join((ul_tile_col + column).to_string())
					.join(format!("{}.pbf", ul_tile_row + row));
				debug!("slabization of pbf tile {path:?}");

				match std::fs::read(&path) {
					Ok(data) => {
						ensure!(!data.is_empty(), "PBF tile {path:?} is empty");
						self.append_payload(tile, &data)?;
					}
					Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
						debug!("cannot open PBF tile {path:?}, leaving an empty entry");
						self.index.set(tile, self.position as u32, 0);
					}
					Err(e) => return Err(e).with_context(|| format!("error reading PBF tile {path:?}")),
				}
			}
		}
		Ok(())
	}

	/// Writes the tile index and closes the object.
	pub fn finalize(&mut self) -> Result<()> {
		let blob = self.index.as_blob();
		let count = self.index.len();
		self
			.storage
			.write(&blob.as_slice()[..4 * count], SLAB_HEADER_SIZE as u64, &self.name)
			.with_context(|| format!("cannot write the tile offsets for '{}'", self.name))?;
		self
			.storage
			.write(
				&blob.as_slice()[4 * count..],
				SLAB_HEADER_SIZE as u64 + 4 * count as u64,
				&self.name,
			)
			.with_context(|| format!("cannot write the tile sizes for '{}'", self.name))?;
		self
			.storage
			.close_to_write(&self.name)
			.with_context(|| format!("unable to close output '{}'", self.name))
	}
}

/// Whitens every `JPEG_BLOCK_SIZE`-wide pixel block of the band that holds at
/// least one pure-white pixel.
fn empty_white_block(band: &mut [u8], lines: usize, line_size: usize, channels: usize) {
	let block_line_size = JPEG_BLOCK_SIZE * channels;
	let mut column = 0usize;

	while column < line_size {
		let white_found = (0..lines).any(|line| band[line * line_size + column..line * line_size + column + channels]
			.iter()
			.all(|&sample| sample == 255));

		if white_found {
			let block_start = (column / block_line_size) * block_line_size;
			let block_end = (block_start + block_line_size).min(line_size);
			for line in 0..lines {
				for pixel in (block_start..block_end).step_by(channels) {
					band[line * line_size + pixel..line * line_size + pixel + channels].fill(255);
				}
			}
			column = block_end;
		} else {
			column += channels;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::slab::reader::SlabReader;
	use slabtiles_core::storage::{FileStorage, Storage};
	use std::sync::Arc;

	fn file_storage() -> (assert_fs::TempDir, SharedStorage) {
		let dir = assert_fs::TempDir::new().unwrap();
		let storage: SharedStorage = Arc::new(FileStorage::new(dir.path()));
		(dir, storage)
	}

	fn rgb_format(compression: Compression) -> PixelFormat {
		PixelFormat::new(SampleFormat::UInt, 8, 3, Photometric::Rgb, compression).unwrap()
	}

	#[test]
	fn payloads_are_16_byte_aligned() {
		let (_dir, storage) = file_storage();
		let mut writer = SlabWriter::new(
			Arc::clone(&storage),
			"slab.tif",
			rgb_format(Compression::Deflate),
			512,
			512,
			256,
			256,
		)
		.unwrap();

		writer.write_header().unwrap();
		let tile: Vec<u8> = (0..256 * 256 * 3).map(|i| (i % 251) as u8).collect();
		for index in 0..4 {
			writer.write_tile(index, &tile, false).unwrap();
		}
		writer.finalize().unwrap();

		let reader = SlabReader::open(storage, "slab.tif").unwrap().unwrap();
		for index in 0..4 {
			let range = reader.encoded_tile(index).unwrap();
			assert!(!range.is_empty());
		}
	}

	#[test]
	fn single_tile_slab_records_inline_size() {
		let (_dir, storage) = file_storage();
		let mut writer = SlabWriter::new(
			Arc::clone(&storage),
			"one.tif",
			rgb_format(Compression::None),
			256,
			256,
			256,
			256,
		)
		.unwrap();

		writer.write_header().unwrap();
		let tile = vec![9u8; 256 * 256 * 3];
		writer.write_tile(0, &tile, false).unwrap();
		writer.finalize().unwrap();

		// the TileByteCounts tag value carries the payload size
		let patched = storage.read(134, 4, "one.tif").unwrap();
		assert_eq!(LittleEndian::read_u32(patched.as_slice()), (256 * 256 * 3) as u32);

		let mut reader = SlabReader::open(storage, "one.tif").unwrap().unwrap();
		assert_eq!(reader.raw_tile(0).unwrap(), tile.as_slice());
	}

	#[test]
	fn jpeg_slab_switches_to_ycbcr() {
		let (_dir, storage) = file_storage();
		let writer = SlabWriter::new(
			Arc::clone(&storage),
			"jpeg.tif",
			rgb_format(Compression::Jpeg),
			256,
			256,
			256,
			256,
		)
		.unwrap();
		assert_eq!(writer.header.as_ref().unwrap().format.photometric, Photometric::Ycbcr);
	}

	#[test]
	fn gray_jpeg_is_rejected() {
		let (_dir, storage) = file_storage();
		let format = PixelFormat::new(SampleFormat::UInt, 8, 1, Photometric::Gray, Compression::Jpeg).unwrap();
		assert!(SlabWriter::new(storage, "bad.tif", format, 256, 256, 256, 256).is_err());
	}

	#[test]
	fn crop_whitens_blocks_with_a_white_pixel() {
		let lines = JPEG_BLOCK_SIZE;
		let line_size = 32 * 3;
		let mut band = vec![100u8; lines * line_size];
		// one pure-white pixel in the first 16-pixel block
		band[5 * line_size + 3 * 3..5 * line_size + 4 * 3].fill(255);

		empty_white_block(&mut band, lines, line_size, 3);

		for line in 0..lines {
			let row = &band[line * line_size..(line + 1) * line_size];
			// first block is fully white, second untouched
			assert!(row[..JPEG_BLOCK_SIZE * 3].iter().all(|&sample| sample == 255));
			assert!(row[JPEG_BLOCK_SIZE * 3..].iter().all(|&sample| sample == 100));
		}
	}

	#[test]
	fn jpeg_crop_white_survives_the_roundtrip() {
		let (_dir, storage) = file_storage();
		let mut writer = SlabWriter::new(
			Arc::clone(&storage),
			"crop.tif",
			rgb_format(Compression::Jpeg),
			64,
			64,
			64,
			64,
		)
		.unwrap();

		// one pure-white pixel inside the first 16x16 block
		let mut tile = vec![200u8; 64 * 64 * 3];
		tile[(5 * 64 + 5) * 3..(5 * 64 + 5) * 3 + 3].fill(255);

		writer.write_header().unwrap();
		writer.write_tile(0, &tile, true).unwrap();
		writer.finalize().unwrap();

		let mut reader = SlabReader::open(storage, "crop.tif").unwrap().unwrap();
		let decoded = reader.raw_tile(0).unwrap();

		// the whole 16x16 block comes back pure white
		for line in 0..16 {
			for column in 0..16 {
				let pixel = &decoded[(line * 64 + column) * 3..(line * 64 + column) * 3 + 3];
				assert_eq!(pixel, &[255, 255, 255], "pixel ({column},{line}) should be white");
			}
		}

		// a block far from the white one keeps its colour
		for line in 40..48 {
			for column in 40..48 {
				let pixel = &decoded[(line * 64 + column) * 3..(line * 64 + column) * 3 + 3];
				for &sample in pixel {
					assert!(
						(i16::from(sample) - 200).abs() <= 6,
						"pixel ({column},{line}) drifted: {pixel:?}"
					);
				}
			}
		}
	}

	#[test]
	fn pbf_tiles_are_packed_with_gaps() {
		let (dir, storage) = file_storage();

		// tiles 0 and 3 exist, 1 and 2 are missing
		let pbf_root = dir.path().join("pbf");
		std::fs::create_dir_all(pbf_root.join("10")).unwrap();
		std::fs::create_dir_all(pbf_root.join("11")).unwrap();
		std::fs::write(pbf_root.join("10").join("20.pbf"), b"tile-a").unwrap();
		std::fs::write(pbf_root.join("11").join("21.pbf"), b"tile-b").unwrap();

		let mut writer = SlabWriter::new_vector(Arc::clone(&storage), "vector.tif", 2, 2).unwrap();
		writer.write_header().unwrap();
		writer.write_pbf_tiles(&pbf_root, 10, 20).unwrap();
		writer.finalize().unwrap();

		// vector slabs share the raster layout; check it through the raw index
		let index_blob = storage.read(SLAB_HEADER_SIZE as u64, 8 * 4, "vector.tif").unwrap();
		let index = crate::slab::tile_index::TileIndex::from_blob(&index_blob, 4).unwrap();

		let tile = |i: usize| {
			let range = index.get(i);
			storage.read(range.offset, range.length.max(1), "vector.tif").unwrap()
		};
		assert_eq!(tile(0).as_slice(), b"tile-a");
		assert_eq!(index.get(1).length, 0);
		assert_eq!(index.get(2).length, 0);
		assert_eq!(tile(3).as_slice(), b"tile-b");
	}
}
