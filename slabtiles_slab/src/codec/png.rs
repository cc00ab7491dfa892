//! PNG tile codec.
//!
//! Tiles are decoded with the standard PNG decoder. Writing builds the
//! minimal chunk sequence by hand (IHDR, one IDAT with filter-0 rows, IEND),
//! which is what slab consumers expect and keeps the payload deterministic.

use anyhow::{Context, Result, bail};
use flate2::{Compression as FlateLevel, Crc, read::ZlibEncoder};
use image::ImageFormat;
use std::io::Read;

/// 8-byte PNG signature, also used to discriminate PNG payloads carried
/// under the deflate compression code.
pub const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

const PNG_IEND: [u8; 12] = [0, 0, 0, 0, b'I', b'E', b'N', b'D', 0xae, 0x42, 0x60, 0x82];

/// `true` when the payload starts with the PNG signature.
pub fn is_png(data: &[u8]) -> bool {
	data.len() >= 8 && data[0..8] == PNG_SIGNATURE
}

/// Decodes a PNG payload to raw interleaved samples.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
	let image = image::load_from_memory_with_format(data, ImageFormat::Png).context("cannot decode PNG tile")?;
	Ok(image.into_bytes())
}

/// Encodes raw 8-bit samples as a PNG payload.
pub fn encode(data: &[u8], width: u32, height: u32, channels: u16) -> Result<Vec<u8>> {
	let colour_type: u8 = match channels {
		1 => 0,
		2 => 4,
		3 => 2,
		4 => 6,
		_ => bail!("PNG tiles support 1 to 4 channels, got {channels}"),
	};

	let line_size = width as usize * channels as usize;

	// filter byte 0 in front of every row, then one zlib stream
	let mut filtered = Vec::with_capacity((line_size + 1) * height as usize);
	for line in data.chunks(line_size) {
		filtered.push(0);
		filtered.extend_from_slice(line);
	}
	let mut idat_data = Vec::new();
	ZlibEncoder::new(filtered.as_slice(), FlateLevel::new(5))
		.read_to_end(&mut idat_data)
		.context("cannot deflate PNG tile")?;

	let mut output = Vec::with_capacity(33 + 12 + idat_data.len() + PNG_IEND.len());
	output.extend_from_slice(&PNG_SIGNATURE);

	// IHDR
	output.extend_from_slice(&13u32.to_be_bytes());
	output.extend_from_slice(b"IHDR");
	output.extend_from_slice(&width.to_be_bytes());
	output.extend_from_slice(&height.to_be_bytes());
	output.extend_from_slice(&[8, colour_type, 0, 0, 0]);
	let mut crc = Crc::new();
	crc.update(&output[12..29]);
	output.extend_from_slice(&crc.sum().to_be_bytes());

	// IDAT
	output.extend_from_slice(&(idat_data.len() as u32).to_be_bytes());
	let idat_start = output.len();
	output.extend_from_slice(b"IDAT");
	output.extend_from_slice(&idat_data);
	let mut crc = Crc::new();
	crc.update(&output[idat_start..]);
	output.extend_from_slice(&crc.sum().to_be_bytes());

	output.extend_from_slice(&PNG_IEND);
	Ok(output)
}
