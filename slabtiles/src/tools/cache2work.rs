//! `cache2work`: decode a slab into an untiled work TIFF.

use super::BackendArgs;
use super::work2cache::CodecArg;
use anyhow::{Context, Result, bail};
use clap::Args;
use log::info;
use slabtiles_core::SampleFormat;
use slabtiles_slab::SlabReader;
use std::fs::File;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct Subcommand {
	/// Input slab name
	pub input: String,

	/// Output work TIFF
	pub output: PathBuf,

	/// Compression of the work TIFF
	#[arg(short = 'c', value_enum, default_value = "raw")]
	pub compression: CodecArg,

	#[command(flatten)]
	pub backend: BackendArgs,
}

pub fn run(args: &Subcommand) -> Result<()> {
	use tiff::encoder::{TiffEncoder, colortype, compression};

	let storage = args.backend.storage()?;
	let Some(mut reader) = SlabReader::open(storage, &args.input)? else {
		bail!("slab '{}' does not exist", args.input);
	};

	let header = reader.header().clone();
	let width = header.width;
	let height = header.height;

	// pull every scanline through the slab's decoders
	let mut data: Vec<u8> = Vec::with_capacity(height as usize * width as usize * header.format.pixel_size());
	for line in 0..height {
		data.extend_from_slice(&reader.scanline(line)?);
	}

	let file = File::create(&args.output).with_context(|| format!("cannot create work file {:?}", args.output))?;
	let mut encoder = TiffEncoder::new(file)?;

	macro_rules! write_work {
		($colortype:ty, $samples:expr) => {
			match args.compression {
				CodecArg::None | CodecArg::Raw => {
					encoder.write_image_with_compression::<$colortype, _>(width, height, compression::Uncompressed, $samples)?
				}
				CodecArg::Lzw => {
					encoder.write_image_with_compression::<$colortype, _>(width, height, compression::Lzw, $samples)?
				}
				CodecArg::Zip => encoder.write_image_with_compression::<$colortype, _>(
					width,
					height,
					compression::Deflate::default(),
					$samples,
				)?,
				CodecArg::Pkb => {
					encoder.write_image_with_compression::<$colortype, _>(width, height, compression::Packbits, $samples)?
				}
				CodecArg::Jpg | CodecArg::Png => {
					bail!("work files do not support {:?} compression", args.compression)
				}
			}
		};
	}

	let format = header.format;
	match (format.sample_format, format.bits_per_sample, format.channels) {
		(SampleFormat::UInt, 8, 1) => write_work!(colortype::Gray8, &data),
		(SampleFormat::UInt, 8, 3) => write_work!(colortype::RGB8, &data),
		(SampleFormat::UInt, 8, 4) => write_work!(colortype::RGBA8, &data),
		(SampleFormat::UInt, 16, 1) => {
			let samples: Vec<u16> = data
				.chunks_exact(2)
				.map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
				.collect();
			write_work!(colortype::Gray16, &samples)
		}
		(SampleFormat::Float, 32, 1) => {
			let samples: Vec<f32> = data
				.chunks_exact(4)
				.map(|quad| f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
				.collect();
			write_work!(colortype::Gray32Float, &samples)
		}
		(sample_format, bits, channels) => {
			bail!("no work file layout for {sample_format:?} {bits}-bit {channels}-channel slabs")
		}
	}

	info!("decoded slab '{}' into {:?} ({}x{})", args.input, args.output, width, height);
	Ok(())
}
