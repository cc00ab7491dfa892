//! The slab tile index: two parallel arrays of 32-bit little-endian
//! integers, tile offsets first, then tile byte counts.

use anyhow::{Result, ensure};
use byteorder::{ByteOrder, LittleEndian};
use slabtiles_core::{Blob, ByteRange};

/// Index of the encoded tiles inside a slab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileIndex {
	offsets: Vec<u32>,
	sizes: Vec<u32>,
}

impl TileIndex {
	/// Creates a zeroed index for `count` tiles.
	pub fn new_empty(count: usize) -> TileIndex {
		TileIndex {
			offsets: vec![0; count],
			sizes: vec![0; count],
		}
	}

	/// Parses the `8 * count` index bytes read at the end of the header.
	pub fn from_blob(blob: &Blob, count: usize) -> Result<TileIndex> {
		let data = blob.as_slice();
		ensure!(
			data.len() == 8 * count,
			"tile index is {} bytes, expected {} for {count} tiles",
			data.len(),
			8 * count
		);

		let mut offsets = Vec::with_capacity(count);
		let mut sizes = Vec::with_capacity(count);
		for i in 0..count {
			offsets.push(LittleEndian::read_u32(&data[4 * i..]));
			sizes.push(LittleEndian::read_u32(&data[4 * (count + i)..]));
		}
		Ok(TileIndex { offsets, sizes })
	}

	/// Serializes the index back to its on-disk form.
	pub fn as_blob(&self) -> Blob {
		let count = self.offsets.len();
		let mut data = vec![0u8; 8 * count];
		for i in 0..count {
			LittleEndian::write_u32(&mut data[4 * i..], self.offsets[i]);
			LittleEndian::write_u32(&mut data[4 * (count + i)..], self.sizes[i]);
		}
		Blob::from(data)
	}

	pub fn set(&mut self, index: usize, offset: u32, size: u32) {
		self.offsets[index] = offset;
		self.sizes[index] = size;
	}

	/// Byte range of tile `index` within the slab.
	pub fn get(&self, index: usize) -> ByteRange {
		ByteRange::new(u64::from(self.offsets[index]), u64::from(self.sizes[index]))
	}

	pub fn len(&self) -> usize {
		self.offsets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.offsets.is_empty()
	}
}
