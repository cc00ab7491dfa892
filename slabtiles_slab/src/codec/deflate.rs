//! Deflate (zlib) codec, one-shot over the whole tile.

use anyhow::{Context, Result};
use flate2::Compression as FlateLevel;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use std::io::Read;

/// Inflates a zlib-wrapped deflate payload.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
	let mut output = Vec::new();
	ZlibDecoder::new(data)
		.read_to_end(&mut output)
		.context("cannot inflate deflate tile")?;
	Ok(output)
}

/// Deflates raw tile bytes with a zlib wrapper.
pub fn encode(data: &[u8]) -> Result<Vec<u8>> {
	let mut output = Vec::new();
	ZlibEncoder::new(data, FlateLevel::new(6))
		.read_to_end(&mut output)
		.context("cannot deflate tile")?;
	Ok(output)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrip() {
		let data: Vec<u8> = (0..10_000).map(|i| (i % 251) as u8).collect();
		let encoded = encode(&data).unwrap();
		assert!(encoded.len() < data.len());
		assert_eq!(decode(&encoded).unwrap(), data);
	}

	#[test]
	fn garbage_is_an_error() {
		assert!(decode(b"not a zlib stream").is_err());
	}
}
