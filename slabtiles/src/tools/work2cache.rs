//! `work2cache`: encode an untiled work TIFF into a slab.

use super::BackendArgs;
use anyhow::{Context, Result, bail, ensure};
use clap::{Args, ValueEnum};
use log::info;
use slabtiles_core::{Compression, Photometric, PixelFormat, SampleFormat};
use slabtiles_slab::SlabWriter;
use std::fs::File;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CodecArg {
	None,
	Raw,
	Jpg,
	Png,
	Lzw,
	Pkb,
	Zip,
}

impl CodecArg {
	fn to_compression(self) -> Compression {
		match self {
			CodecArg::None | CodecArg::Raw => Compression::None,
			CodecArg::Jpg => Compression::Jpeg,
			CodecArg::Png => Compression::Png,
			CodecArg::Lzw => Compression::Lzw,
			CodecArg::Pkb => Compression::PackBits,
			CodecArg::Zip => Compression::Deflate,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SampleFormatArg {
	Uint,
	Float,
}

#[derive(Args, Debug)]
pub struct Subcommand {
	/// Input work TIFF
	pub input: PathBuf,

	/// Output slab name
	pub output: String,

	/// Tile compression inside the slab
	#[arg(short = 'c', value_enum, default_value = "raw")]
	pub compression: CodecArg,

	/// Tile pixel dimensions
	#[arg(short = 't', num_args = 2, value_names = ["WIDTH", "HEIGHT"], required = true)]
	pub tile: Vec<u32>,

	/// Expected sample format of the input
	#[arg(short = 'a', value_enum)]
	pub sample_format: Option<SampleFormatArg>,

	/// Expected bits per sample of the input
	#[arg(short = 'b')]
	pub bits: Option<u16>,

	/// Expected samples per pixel of the input
	#[arg(short = 's')]
	pub channels: Option<u16>,

	/// Whiten JPEG blocks containing a pure-white pixel
	#[arg(long)]
	pub crop: bool,

	#[command(flatten)]
	pub backend: BackendArgs,
}

/// The decoded work file, flattened to little-endian sample bytes.
struct WorkImage {
	width: u32,
	height: u32,
	channels: u16,
	sample_format: SampleFormat,
	bits_per_sample: u16,
	data: Vec<u8>,
}

fn read_work_tiff(path: &PathBuf) -> Result<WorkImage> {
	use tiff::ColorType;
	use tiff::decoder::{Decoder, DecodingResult, Limits};

	let file = File::open(path).with_context(|| format!("cannot open work file {path:?}"))?;
	let mut decoder = Decoder::new(file)
		.with_context(|| format!("cannot read work file {path:?}"))?
		.with_limits(Limits::unlimited());

	let (width, height) = decoder.dimensions()?;
	let channels = match decoder.colortype()? {
		ColorType::Gray(_) => 1,
		ColorType::GrayA(_) => 2,
		ColorType::RGB(_) => 3,
		ColorType::RGBA(_) => 4,
		other => bail!("unsupported work file colour type {other:?}"),
	};

	let (sample_format, bits_per_sample, data) = match decoder.read_image()? {
		DecodingResult::U8(samples) => (SampleFormat::UInt, 8, samples),
		DecodingResult::U16(samples) => (
			SampleFormat::UInt,
			16,
			samples.iter().flat_map(|v| v.to_le_bytes()).collect(),
		),
		DecodingResult::F32(samples) => (
			SampleFormat::Float,
			32,
			samples.iter().flat_map(|v| v.to_le_bytes()).collect(),
		),
		_ => bail!("unsupported work file sample type"),
	};

	Ok(WorkImage {
		width,
		height,
		channels,
		sample_format,
		bits_per_sample,
		data,
	})
}

pub fn run(args: &Subcommand) -> Result<()> {
	let image = read_work_tiff(&args.input)?;
	let tile_width = args.tile[0];
	let tile_height = args.tile[1];

	// the optional format flags are cross-checked against the file
	if let Some(expected) = args.sample_format {
		let expected = match expected {
			SampleFormatArg::Uint => SampleFormat::UInt,
			SampleFormatArg::Float => SampleFormat::Float,
		};
		ensure!(
			expected == image.sample_format,
			"work file {:?} does not hold {expected:?} samples",
			args.input
		);
	}
	if let Some(bits) = args.bits {
		ensure!(
			bits == image.bits_per_sample,
			"work file {:?} holds {} bits per sample, not {bits}",
			args.input,
			image.bits_per_sample
		);
	}
	if let Some(channels) = args.channels {
		ensure!(
			channels == image.channels,
			"work file {:?} holds {} samples per pixel, not {channels}",
			args.input,
			image.channels
		);
	}

	let photometric = if image.channels >= 3 { Photometric::Rgb } else { Photometric::Gray };
	let format = PixelFormat::new(
		image.sample_format,
		image.bits_per_sample,
		image.channels,
		photometric,
		args.compression.to_compression(),
	)?;

	let storage = args.backend.storage()?;
	let mut writer = SlabWriter::new(
		storage,
		&args.output,
		format,
		image.width,
		image.height,
		tile_width,
		tile_height,
	)?;

	let pixel_size = format.pixel_size();
	let image_line_size = image.width as usize * pixel_size;
	let tile_line_size = tile_width as usize * pixel_size;
	let tiles_per_width = image.width / tile_width;
	let tiles_per_height = image.height / tile_height;

	writer.write_header()?;
	let mut tile = vec![0u8; tile_line_size * tile_height as usize];
	for tile_y in 0..tiles_per_height {
		for tile_x in 0..tiles_per_width {
			for line in 0..tile_height as usize {
				let source = (tile_y as usize * tile_height as usize + line) * image_line_size
					+ tile_x as usize * tile_line_size;
				tile[line * tile_line_size..(line + 1) * tile_line_size]
					.copy_from_slice(&image.data[source..source + tile_line_size]);
			}
			writer.write_tile((tile_y * tiles_per_width + tile_x) as usize, &tile, args.crop)?;
		}
	}
	writer.finalize()?;

	info!(
		"encoded {:?} into slab '{}' ({}x{} tiles)",
		args.input, args.output, tiles_per_width, tiles_per_height
	);
	Ok(())
}
