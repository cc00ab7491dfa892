//! Baseline JPEG tile codec, via the `image` crate.

use anyhow::{Context, Result, bail};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

const JPEG_QUALITY: u8 = 75;

/// Decodes a baseline JPEG payload to raw interleaved samples.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
	let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg).context("cannot decode JPEG tile")?;
	Ok(image.into_bytes())
}

/// Encodes raw 8-bit samples as a baseline JPEG payload.
pub fn encode(data: &[u8], width: u32, height: u32, channels: u16) -> Result<Vec<u8>> {
	let colour_type = match channels {
		1 => ExtendedColorType::L8,
		3 => ExtendedColorType::Rgb8,
		_ => bail!("JPEG tiles support 1 or 3 channels, got {channels}"),
	};

	let mut output = Vec::new();
	JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY)
		.encode(data, width, height, colour_type)
		.context("cannot encode JPEG tile")?;
	Ok(output)
}
