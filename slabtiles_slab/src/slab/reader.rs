//! This module provides the [`SlabReader`], which parses a slab, resolves
//! symbolic indirection, loads the tile index and serves tiles.

use super::header::{MAX_ENCODED_TILE_SIZE, SLAB_HEADER_SIZE, SlabHeader};
use super::tile_index::TileIndex;
use crate::codec;
use anyhow::{Result, bail, ensure};
use log::{debug, warn};
use slabtiles_core::storage::{SharedStorage, Storage, StorageError};
use slabtiles_core::{Blob, Compression};
use std::collections::HashSet;

/// One decoded tile held in a memorization slot.
#[derive(Debug)]
struct MemorizedTile {
	tile: usize,
	data: Vec<u8>,
}

/// Reader over one slab.
///
/// Opening parses the header (following symbolic slabs) and loads the tile
/// index. Decoded tiles are memorized in `tiles_per_width` slots, so one full
/// scanline of tiles stays resident while lines are pulled in order. A reader
/// is owned by a single thread.
#[derive(Debug)]
pub struct SlabReader {
	storage: SharedStorage,
	name: String,
	original_name: Option<String>,
	header: SlabHeader,
	index: TileIndex,
	memorized: Vec<Option<MemorizedTile>>,
}

impl SlabReader {
	/// Opens the named slab.
	///
	/// Returns `Ok(None)` when the slab (or the target of its symbolic
	/// chain) does not exist; corrupt headers and symbolic loops are errors.
	pub fn open(storage: SharedStorage, name: &str) -> Result<Option<SlabReader>> {
		let mut current = name.to_owned();
		let mut visited: HashSet<String> = HashSet::new();

		let header_data = loop {
			visited.insert(current.clone());

			let blob = match storage.read_retrying(0, SLAB_HEADER_SIZE as u64, &current) {
				Ok(blob) => blob,
				Err(StorageError::NotFound(_)) => return Ok(None),
				Err(e) => bail!("cannot read header of slab '{current}': {e}"),
			};

			if (blob.len() as usize) >= SLAB_HEADER_SIZE {
				break blob;
			}

			// a short header is only legitimate for a symbolic slab
			let Some(target) = SlabHeader::symbolic_target(blob.as_slice()) else {
				bail!("bad slab: '{current}' has a short header and is not a symbolic slab");
			};
			debug!("symbolic slab detected: '{current}' references '{target}'");
			if visited.contains(&target) {
				bail!("symbolic slab loop detected while resolving '{name}' (at '{target}')");
			}
			current = target;
		};

		let header = SlabHeader::parse(header_data.as_slice())?;

		let tiles_number = header.tiles_number() as usize;
		let index_blob = match storage.read_retrying(SLAB_HEADER_SIZE as u64, 8 * tiles_number as u64, &current) {
			Ok(blob) => blob,
			Err(e) => bail!("cannot read tile index of slab '{current}': {e}"),
		};
		let index = TileIndex::from_blob(&index_blob, tiles_number)?;

		let memory_size = header.tiles_per_width() as usize;
		let original_name = (current != name).then(|| name.to_owned());

		Ok(Some(SlabReader {
			storage,
			name: current,
			original_name,
			header,
			index,
			memorized: (0..memory_size).map(|_| None).collect(),
		}))
	}

	/// The resolved slab name (the chain target for symbolic slabs).
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The name the reader was opened with, when it was a symbolic slab.
	pub fn original_name(&self) -> Option<&str> {
		self.original_name.as_deref()
	}

	pub fn header(&self) -> &SlabHeader {
		&self.header
	}

	/// Tile index within the slab for slab-relative tile coordinates.
	pub fn tile_at(&self, column: u32, row: u32) -> usize {
		(row * self.header.tiles_per_width() + column) as usize
	}

	/// Returns the encoded payload of tile `tile`, or an empty blob when the
	/// index holds no bytes for it.
	pub fn encoded_tile(&self, tile: usize) -> Result<Blob> {
		let tiles_number = self.header.tiles_number() as usize;
		ensure!(
			tile < tiles_number,
			"invalid tile index {tile}, the slab holds {tiles_number} tiles"
		);

		let range = self.index.get(tile);
		if range.length == 0 {
			return Ok(Blob::new_empty());
		}
		ensure!(
			range.length <= MAX_ENCODED_TILE_SIZE,
			"tile {tile} of slab '{}' records {} bytes, above the {MAX_ENCODED_TILE_SIZE} byte bound",
			self.name,
			range.length
		);

		self
			.storage
			.read_retrying(range.offset, range.length, &self.name)
			.map_err(|e| anyhow::anyhow!("cannot read tile {tile} of slab '{}': {e}", self.name))
	}

	/// Returns the decoded samples of tile `tile`, through the memorization
	/// slots.
	pub fn raw_tile(&mut self, tile: usize) -> Result<&[u8]> {
		let slot = tile % self.memorized.len();

		let is_memorized = self.memorized[slot].as_ref().is_some_and(|m| m.tile == tile);
		if !is_memorized {
			debug!("tile {tile} not memorized: reading and decoding it");
			let encoded = self.encoded_tile(tile)?;
			if encoded.is_empty() {
				bail!("tile {tile} of slab '{}' holds no data", self.name);
			}

			let data = self.decode(encoded.as_slice())?;
			if data.len() != self.header.raw_tile_size() {
				warn!(
					"raw tile size should have been {}, and not {}",
					self.header.raw_tile_size(),
					data.len()
				);
			}
			self.memorized[slot] = Some(MemorizedTile { tile, data });
		}

		Ok(&self.memorized[slot].as_ref().expect("slot filled above").data)
	}

	fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>> {
		// the deflate code may carry PNG tiles; discriminate on the payload
		let compression = match self.header.format.compression {
			Compression::Deflate if codec::png::is_png(encoded) => Compression::Png,
			other => other,
		};
		codec::decode_tile(compression, encoded)
	}

	/// Assembles one output scanline across the slab's tile columns.
	pub fn scanline(&mut self, line: u32) -> Result<Vec<u8>> {
		ensure!(line < self.header.height, "line {line} outside the slab");

		let tile_row = line / self.header.tile_height;
		let tile_line = (line % self.header.tile_height) as usize;
		let line_size = self.header.raw_tile_line_size();
		let tiles_per_width = self.header.tiles_per_width();

		let mut buffer = vec![0u8; line_size * tiles_per_width as usize];
		for tile_column in 0..tiles_per_width {
			let tile = self.tile_at(tile_column, tile_row);
			let data = self.raw_tile(tile)?;

			let start = tile_line * line_size;
			// a short decode contributes what it holds, the rest stays zero
			let end = (start + line_size).min(data.len());
			if start < end {
				let target = tile_column as usize * line_size;
				buffer[target..target + (end - start)].copy_from_slice(&data[start..end]);
			}
		}
		Ok(buffer)
	}
}
