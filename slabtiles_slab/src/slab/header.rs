//! The fixed 2048-byte slab header.
//!
//! The header is TIFF-shaped: little-endian byte-order mark, magic 42, one
//! IFD whose tag values sit at fixed offsets. It is parsed at those offsets
//! directly, without a TIFF library, so the header stays readable whatever
//! the storage backend.
//!
//! Fixed value offsets (little-endian):
//!
//! | offset | size | meaning |
//! |---|---|---|
//! | 0 | 2 | byte order mark 0x4949 |
//! | 2 | 2 | TIFF magic 42 |
//! | 8 | 2 | bits per sample |
//! | 26 | 4 | image width |
//! | 38 | 4 | image height |
//! | 62 | 4 | compression code |
//! | 74 | 2 | photometric |
//! | 86 | 4 | samples per pixel |
//! | 98 | 4 | tile width |
//! | 110 | 4 | tile height |
//! | 138 | 2 | tag discriminator: ExtraSamples or SampleFormat |
//! | 146 | 4 | value of the discriminated tag |
//! | 158 | 4 | SampleFormat when the discriminator was ExtraSamples |

use anyhow::{Result, bail, ensure};
use byteorder::{ByteOrder, LittleEndian};
use slabtiles_core::{Blob, Compression, Photometric, PixelFormat, SampleFormat};

/// Size of the slab header in bytes; the tile index follows immediately.
pub const SLAB_HEADER_SIZE: usize = 2048;

/// Signature opening a symbolic slab; the UTF-8 target name follows.
pub const SLAB_LINK_SIGNATURE: &[u8; 8] = b"SYMLINK#";

/// Safety bound on the recorded size of one encoded tile.
pub const MAX_ENCODED_TILE_SIZE: u64 = 1 << 20;

const TIFF_SHORT: u16 = 3;
const TIFF_LONG: u16 = 4;

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_TILE_WIDTH: u16 = 322;
const TAG_TILE_LENGTH: u16 = 323;
const TAG_TILE_OFFSETS: u16 = 324;
const TAG_TILE_BYTE_COUNTS: u16 = 325;
const TAG_EXTRA_SAMPLES: u16 = 338;
const TAG_SAMPLE_FORMAT: u16 = 339;
const TAG_YCBCR_SUBSAMPLING: u16 = 530;

/// Unassociated alpha, the extra-sample interpretation written for 2- and
/// 4-channel slabs.
const EXTRA_SAMPLE_UNASSOC: u32 = 2;

/// Parsed slab header.
#[derive(Clone, Debug, PartialEq)]
pub struct SlabHeader {
	pub width: u32,
	pub height: u32,
	pub tile_width: u32,
	pub tile_height: u32,
	pub format: PixelFormat,
}

impl SlabHeader {
	/// Returns the symbolic-slab target name when `data` opens with the link
	/// signature.
	pub fn symbolic_target(data: &[u8]) -> Option<String> {
		if data.len() >= SLAB_LINK_SIGNATURE.len() && &data[..SLAB_LINK_SIGNATURE.len()] == SLAB_LINK_SIGNATURE {
			Some(String::from_utf8_lossy(&data[SLAB_LINK_SIGNATURE.len()..]).into_owned())
		} else {
			None
		}
	}

	/// Parses a full header block.
	pub fn parse(data: &[u8]) -> Result<SlabHeader> {
		ensure!(
			data.len() >= SLAB_HEADER_SIZE,
			"slab header is {} bytes, expected {SLAB_HEADER_SIZE}",
			data.len()
		);
		ensure!(
			LittleEndian::read_u16(&data[0..]) == 0x4949 && LittleEndian::read_u16(&data[2..]) == 42,
			"bad slab: header carries no little-endian TIFF preamble"
		);

		let width = LittleEndian::read_u32(&data[26..]);
		let height = LittleEndian::read_u32(&data[38..]);
		let tile_width = LittleEndian::read_u32(&data[98..]);
		let tile_height = LittleEndian::read_u32(&data[110..]);
		let channels = LittleEndian::read_u32(&data[86..]) as u16;
		let bits_per_sample = LittleEndian::read_u16(&data[8..]);
		let photometric = Photometric::from_tiff_code(LittleEndian::read_u16(&data[74..]))?;
		let compression = Compression::from_tiff_code(LittleEndian::read_u32(&data[62..]))?;

		// the tag at 138 is either ExtraSamples (alpha slabs) or SampleFormat
		let discriminator = LittleEndian::read_u16(&data[138..]);
		let sample_format_code = match discriminator {
			TAG_EXTRA_SAMPLES => LittleEndian::read_u32(&data[158..]),
			TAG_SAMPLE_FORMAT => LittleEndian::read_u32(&data[146..]),
			tag => bail!("bad slab: inconsistent TIFF tag {tag} where ExtraSamples or SampleFormat was expected"),
		};
		let sample_format = SampleFormat::from_tiff_code(sample_format_code)?;

		ensure!(
			tile_width > 0 && tile_height > 0 && width % tile_width == 0 && height % tile_height == 0,
			"bad slab: dimensions {width}x{height} are not a multiple of the tile dimensions {tile_width}x{tile_height}"
		);

		Ok(SlabHeader {
			width,
			height,
			tile_width,
			tile_height,
			format: PixelFormat::new(sample_format, bits_per_sample, channels, photometric, compression)?,
		})
	}

	pub fn tiles_per_width(&self) -> u32 {
		self.width / self.tile_width
	}

	pub fn tiles_per_height(&self) -> u32 {
		self.height / self.tile_height
	}

	pub fn tiles_number(&self) -> u32 {
		self.tiles_per_width() * self.tiles_per_height()
	}

	/// Byte size of one decoded tile.
	pub fn raw_tile_size(&self) -> usize {
		self.tile_width as usize * self.tile_height as usize * self.format.pixel_size()
	}

	/// Byte size of one decoded tile scanline.
	pub fn raw_tile_line_size(&self) -> usize {
		self.tile_width as usize * self.format.pixel_size()
	}

	/// Builds the 2048-byte header block for a raster slab.
	pub fn build(&self) -> Blob {
		let mut data = vec![0u8; SLAB_HEADER_SIZE];
		let bits = self.format.bits_per_sample;
		let channels = self.format.channels;
		let tiles_number = self.tiles_number();

		LittleEndian::write_u16(&mut data[0..], 0x4949);
		LittleEndian::write_u16(&mut data[2..], 42);
		LittleEndian::write_u32(&mut data[4..], 16);

		// sample sizes, one per potential channel
		for i in 0..4 {
			LittleEndian::write_u16(&mut data[8 + 2 * i..], bits);
		}

		let has_alpha = channels == 4 || channels == 2;
		let is_ycbcr = self.format.photometric == Photometric::Ycbcr;
		let mut entries = 11u16;
		if has_alpha {
			entries += 1;
		}
		if is_ycbcr {
			entries += 1;
		}
		LittleEndian::write_u16(&mut data[16..], entries);

		let position = std::cell::Cell::new(18usize);
		let write_tag = |data: &mut [u8], tag: u16, kind: u16, count: u32, value: u32| {
			let pos = position.get();
			LittleEndian::write_u16(&mut data[pos..], tag);
			LittleEndian::write_u16(&mut data[pos + 2..], kind);
			LittleEndian::write_u32(&mut data[pos + 4..], count);
			LittleEndian::write_u32(&mut data[pos + 8..], value);
			position.set(pos + 12);
		};

		write_tag(&mut data, TAG_IMAGE_WIDTH, TIFF_LONG, 1, self.width);
		write_tag(&mut data, TAG_IMAGE_LENGTH, TIFF_LONG, 1, self.height);

		if channels == 2 {
			// two inline shorts
			let pos = position.get();
			LittleEndian::write_u16(&mut data[pos..], TAG_BITS_PER_SAMPLE);
			LittleEndian::write_u16(&mut data[pos + 2..], TIFF_SHORT);
			LittleEndian::write_u32(&mut data[pos + 4..], 2);
			LittleEndian::write_u16(&mut data[pos + 8..], 8);
			LittleEndian::write_u16(&mut data[pos + 10..], 8);
			position.set(pos + 12);
		} else if channels == 1 {
			write_tag(&mut data, TAG_BITS_PER_SAMPLE, TIFF_SHORT, 1, u32::from(bits));
		} else {
			write_tag(&mut data, TAG_BITS_PER_SAMPLE, TIFF_SHORT, u32::from(channels), 8);
		}

		write_tag(
			&mut data,
			TAG_COMPRESSION,
			TIFF_SHORT,
			1,
			self.format.compression.to_tiff_code(),
		);
		write_tag(
			&mut data,
			TAG_PHOTOMETRIC,
			TIFF_SHORT,
			1,
			u32::from(self.format.photometric.to_tiff_code()),
		);
		write_tag(&mut data, TAG_SAMPLES_PER_PIXEL, TIFF_SHORT, 1, u32::from(channels));
		write_tag(&mut data, TAG_TILE_WIDTH, TIFF_LONG, 1, self.tile_width);
		write_tag(&mut data, TAG_TILE_LENGTH, TIFF_LONG, 1, self.tile_height);

		// a single-tile slab stores offset and size inline right after the
		// header, so the offsets tag points 8 bytes further
		let offsets_value = if tiles_number == 1 {
			SLAB_HEADER_SIZE as u32 + 8
		} else {
			SLAB_HEADER_SIZE as u32
		};
		write_tag(&mut data, TAG_TILE_OFFSETS, TIFF_LONG, tiles_number, offsets_value);
		write_tag(
			&mut data,
			TAG_TILE_BYTE_COUNTS,
			TIFF_LONG,
			tiles_number,
			SLAB_HEADER_SIZE as u32 + 4 * tiles_number,
		);

		if has_alpha {
			write_tag(&mut data, TAG_EXTRA_SAMPLES, TIFF_SHORT, 1, EXTRA_SAMPLE_UNASSOC);
		}
		write_tag(
			&mut data,
			TAG_SAMPLE_FORMAT,
			TIFF_SHORT,
			1,
			self.format.sample_format.to_tiff_code(),
		);

		if is_ycbcr {
			let pos = position.get();
			LittleEndian::write_u16(&mut data[pos..], TAG_YCBCR_SUBSAMPLING);
			LittleEndian::write_u16(&mut data[pos + 2..], TIFF_SHORT);
			LittleEndian::write_u32(&mut data[pos + 4..], 2);
			LittleEndian::write_u16(&mut data[pos + 8..], 2);
			LittleEndian::write_u16(&mut data[pos + 10..], 2);
		}

		Blob::from(data)
	}

	/// Builds the header block for a vector slab.
	///
	/// The sample fields stay zeroed and only 4 tags are written; dimension
	/// tags are placeholders, vector slabs are never read as rasters.
	pub fn build_vector(tiles_per_width: u32, tiles_per_height: u32) -> Blob {
		let mut data = vec![0u8; SLAB_HEADER_SIZE];
		let tiles_number = tiles_per_width * tiles_per_height;

		LittleEndian::write_u16(&mut data[0..], 0x4949);
		LittleEndian::write_u16(&mut data[2..], 42);
		LittleEndian::write_u32(&mut data[4..], 16);
		LittleEndian::write_u16(&mut data[16..], 4);

		let mut position = 18usize;
		let mut write_tag = |data: &mut [u8], tag: u16, kind: u16, count: u32, value: u32| {
			LittleEndian::write_u16(&mut data[position..], tag);
			LittleEndian::write_u16(&mut data[position + 2..], kind);
			LittleEndian::write_u32(&mut data[position + 4..], count);
			LittleEndian::write_u32(&mut data[position + 8..], value);
			position += 12;
		};

		write_tag(&mut data, TAG_IMAGE_WIDTH, TIFF_LONG, 1, 1);
		write_tag(&mut data, TAG_IMAGE_LENGTH, TIFF_LONG, 1, 1);
		let offsets_value = if tiles_number == 1 {
			SLAB_HEADER_SIZE as u32 + 8
		} else {
			SLAB_HEADER_SIZE as u32
		};
		write_tag(&mut data, TAG_TILE_OFFSETS, TIFF_LONG, tiles_number, offsets_value);
		write_tag(
			&mut data,
			TAG_TILE_BYTE_COUNTS,
			TIFF_LONG,
			tiles_number,
			SLAB_HEADER_SIZE as u32 + 4 * tiles_number,
		);

		Blob::from(data)
	}
}
