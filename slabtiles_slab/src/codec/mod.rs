//! Per-tile codecs: none, LZW, PackBits, deflate, PNG and JPEG.
//!
//! Decoders are pure and fallible: they take an encoded payload and yield a
//! raw sample buffer. The deflate compression code may carry either raw
//! deflate tiles or PNG tiles; [`decode_tile`] discriminates on the PNG
//! signature, as the slab format prescribes.

pub mod deflate;
pub mod jpeg;
pub mod lzw;
pub mod packbits;
pub mod png;

use anyhow::Result;
use slabtiles_core::Compression;

/// Decodes one encoded tile payload to raw samples.
pub fn decode_tile(compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
	match compression {
		Compression::None => Ok(data.to_vec()),
		Compression::Lzw => lzw::decode(data),
		Compression::PackBits => packbits::decode(data),
		Compression::Jpeg => jpeg::decode(data),
		Compression::Png => png::decode(data),
		Compression::Deflate => {
			if png::is_png(data) {
				png::decode(data)
			} else {
				deflate::decode(data)
			}
		}
	}
}

/// Encodes one raw tile.
///
/// `line_size` is the raw byte length of one tile scanline (PackBits encodes
/// per line); `width`/`height`/`channels` describe the tile for the
/// image-format codecs.
pub fn encode_tile(
	compression: Compression,
	data: &[u8],
	line_size: usize,
	width: u32,
	height: u32,
	channels: u16,
) -> Result<Vec<u8>> {
	match compression {
		Compression::None => Ok(data.to_vec()),
		Compression::Lzw => Ok(lzw::encode(data)),
		Compression::PackBits => Ok(packbits::encode(data, line_size)),
		Compression::Deflate => deflate::encode(data),
		Compression::Png => png::encode(data, width, height, channels),
		Compression::Jpeg => jpeg::encode(data, width, height, channels),
	}
}
