//! This module defines the pixel-format vocabulary of a slab: sample format,
//! photometric interpretation and tile compression, with their TIFF codes.

use anyhow::{Result, bail};
use std::fmt;

/// How a sample value is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
	/// Unsigned integer samples (8 or 16 bits).
	UInt,
	/// IEEE floating point samples (32 bits).
	Float,
}

impl SampleFormat {
	/// TIFF `SampleFormat` tag value.
	pub fn to_tiff_code(self) -> u32 {
		match self {
			SampleFormat::UInt => 1,
			SampleFormat::Float => 3,
		}
	}

	pub fn from_tiff_code(code: u32) -> Result<SampleFormat> {
		match code {
			1 => Ok(SampleFormat::UInt),
			3 => Ok(SampleFormat::Float),
			_ => bail!("unsupported TIFF sample format code {code}"),
		}
	}
}

/// Photometric interpretation of the samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Photometric {
	Gray,
	Rgb,
	Ycbcr,
	/// Single-channel data mask.
	Mask,
}

impl Photometric {
	pub fn to_tiff_code(self) -> u16 {
		match self {
			// a mask is written as min-is-black gray
			Photometric::Gray | Photometric::Mask => 1,
			Photometric::Rgb => 2,
			Photometric::Ycbcr => 6,
		}
	}

	pub fn from_tiff_code(code: u16) -> Result<Photometric> {
		match code {
			0 | 1 => Ok(Photometric::Gray),
			2 => Ok(Photometric::Rgb),
			6 => Ok(Photometric::Ycbcr),
			4 => Ok(Photometric::Mask),
			_ => bail!("unsupported TIFF photometric code {code}"),
		}
	}
}

/// Tile compression inside a slab.
///
/// The TIFF codes are the standard ones; PNG tiles are carried under the
/// deflate code and recognized by their payload signature, so `Png` maps to
/// the deflate code when written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
	None,
	Lzw,
	Jpeg,
	Deflate,
	Png,
	PackBits,
}

impl Compression {
	pub fn to_tiff_code(self) -> u32 {
		match self {
			Compression::None => 1,
			Compression::Lzw => 5,
			Compression::Jpeg => 7,
			Compression::Deflate | Compression::Png => 8,
			Compression::PackBits => 32773,
		}
	}

	pub fn from_tiff_code(code: u32) -> Result<Compression> {
		match code {
			1 => Ok(Compression::None),
			5 => Ok(Compression::Lzw),
			7 => Ok(Compression::Jpeg),
			// 32946 is the legacy deflate code
			8 | 32946 => Ok(Compression::Deflate),
			32773 => Ok(Compression::PackBits),
			_ => bail!("unknown TIFF compression code {code}"),
		}
	}

	/// `true` when the encoded tile payload is a self-describing format that
	/// downstream consumers accept without a TIFF envelope.
	pub fn is_self_describing(self) -> bool {
		matches!(self, Compression::Jpeg | Compression::Png)
	}
}

impl fmt::Display for Compression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Compression::None => "none",
			Compression::Lzw => "lzw",
			Compression::Jpeg => "jpeg",
			Compression::Deflate => "deflate",
			Compression::Png => "png",
			Compression::PackBits => "packbits",
		};
		write!(f, "{name}")
	}
}

/// The complete pixel format of a level or slab.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelFormat {
	pub sample_format: SampleFormat,
	pub bits_per_sample: u16,
	pub channels: u16,
	pub photometric: Photometric,
	pub compression: Compression,
}

impl PixelFormat {
	pub fn new(
		sample_format: SampleFormat,
		bits_per_sample: u16,
		channels: u16,
		photometric: Photometric,
		compression: Compression,
	) -> Result<PixelFormat> {
		let format = PixelFormat {
			sample_format,
			bits_per_sample,
			channels,
			photometric,
			compression,
		};
		format.validate()?;
		Ok(format)
	}

	/// Checks the sample/bits combination and channel count.
	pub fn validate(&self) -> Result<()> {
		match (self.sample_format, self.bits_per_sample) {
			(SampleFormat::UInt, 8 | 16) | (SampleFormat::Float, 32) => {}
			(sf, bits) => bail!("unsupported sample type: {sf:?} with {bits} bits per sample"),
		}
		if self.channels == 0 || self.channels > 4 {
			bail!("channels must be between 1 and 4, got {}", self.channels);
		}
		if self.compression == Compression::Jpeg
			&& (self.sample_format != SampleFormat::UInt || self.bits_per_sample != 8)
		{
			bail!("JPEG compression only handles 8-bit integer samples");
		}
		if self.compression == Compression::Png && (self.sample_format != SampleFormat::UInt || self.bits_per_sample != 8)
		{
			bail!("PNG compression only handles 8-bit integer samples");
		}
		Ok(())
	}

	/// Size of one pixel in bytes.
	pub fn pixel_size(&self) -> usize {
		self.bits_per_sample as usize * self.channels as usize / 8
	}

	/// Size of one sample in bytes.
	pub fn sample_size(&self) -> usize {
		self.bits_per_sample as usize / 8
	}
}
