use anyhow::Result;
use clap::{Parser, Subcommand};
use log::error;
use slabtiles::tools;

#[derive(Parser, Debug)]
#[command(
	author,
	version,
	about,
	long_about = None,
	propagate_version = true,
	disable_help_subcommand = true,
)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Print debug logs
	#[arg(short = 'd', global = true)]
	debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Decode a slab into an untiled work TIFF
	Cache2work(tools::cache2work::Subcommand),

	/// Encode a work TIFF into a slab
	Work2cache(tools::work2cache::Subcommand),

	/// Pack PBF tiles into a vector slab
	Pbf2cache(tools::pbf2cache::Subcommand),
}

fn main() {
	let cli = match Cli::try_parse() {
		Ok(cli) => cli,
		Err(e) => {
			// usage and argument errors exit with -1
			let _ = e.print();
			std::process::exit(-1);
		}
	};

	env_logger::Builder::new()
		.filter_level(if cli.debug {
			log::LevelFilter::Debug
		} else {
			log::LevelFilter::Info
		})
		.format_timestamp(None)
		.init();

	if let Err(e) = run(cli) {
		error!("{e:#}");
		std::process::exit(1);
	}
}

fn run(cli: Cli) -> Result<()> {
	match &cli.command {
		Commands::Cache2work(arguments) => tools::cache2work::run(arguments),
		Commands::Work2cache(arguments) => tools::work2cache::run(arguments),
		Commands::Pbf2cache(arguments) => tools::pbf2cache::run(arguments),
	}
}

#[cfg(test)]
mod tests {
	use super::Cli;
	use clap::Parser;

	#[test]
	fn help() {
		let err = Cli::try_parse_from(vec!["slabtiles"]).unwrap_err().to_string();
		assert!(err.contains("Usage: slabtiles"));
	}

	#[test]
	fn subcommands_are_known() {
		for subcommand in ["cache2work", "work2cache", "pbf2cache"] {
			let err = Cli::try_parse_from(vec!["slabtiles", subcommand]).unwrap_err().to_string();
			assert!(
				err.contains("required"),
				"'{subcommand}' should ask for its required arguments: {err}"
			);
		}
	}

	#[test]
	fn work2cache_parses() {
		let cli = Cli::try_parse_from(vec![
			"slabtiles",
			"work2cache",
			"input.tif",
			"output.tif",
			"-c",
			"jpg",
			"-t",
			"256",
			"256",
			"--crop",
			"-d",
		])
		.unwrap();
		assert!(cli.debug);
	}
}
