//! `pbf2cache`: pack per-tile `.pbf` files into a vector slab.

use super::BackendArgs;
use anyhow::Result;
use clap::Args;
use log::info;
use slabtiles_slab::SlabWriter;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct Subcommand {
	/// Root directory of the PBF tile tree ({root}/{col}/{row}.pbf)
	#[arg(short = 'r', value_name = "DIR", required = true)]
	pub root: PathBuf,

	/// Tiles per slab, width and height
	#[arg(short = 't', num_args = 2, value_names = ["WIDTH", "HEIGHT"], required = true)]
	pub tiling: Vec<u32>,

	/// Tile indices of the slab's upper-left tile
	#[arg(long = "ultile", num_args = 2, value_names = ["COL", "ROW"], required = true)]
	pub ultile: Vec<u32>,

	/// Output slab name
	pub output: String,

	#[command(flatten)]
	pub backend: BackendArgs,
}

pub fn run(args: &Subcommand) -> Result<()> {
	let storage = args.backend.storage()?;

	let mut writer = SlabWriter::new_vector(storage, &args.output, args.tiling[0], args.tiling[1])?;
	writer.write_header()?;
	writer.write_pbf_tiles(&args.root, args.ultile[0], args.ultile[1])?;
	writer.finalize()?;

	info!(
		"packed {}x{} PBF tiles from {:?} into slab '{}'",
		args.tiling[0], args.tiling[1], args.root, args.output
	);
	Ok(())
}
