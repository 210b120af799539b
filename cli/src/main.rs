mod menu;

use std::{io, path::PathBuf};

use anyhow::Context;
use attic_core::{logging, Config, LifecycleEngine, RecordStore};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "attic", version, about = "Archive inactive files and manage the archive")]
struct Args {
	/// Path to the TOML configuration file.
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let config = Config::load(&args.config)?;

	let dispatch = logging::file_dispatch(&config.log_file)?;
	let store = RecordStore::open(&config.database_name, dispatch.clone())
		.context("could not open the record store")?;

	// The engine owns the store; it is closed when this scope ends, error or not.
	let engine = LifecycleEngine::new(store, dispatch);
	let stdin = io::stdin();
	menu::run(&engine, &config, stdin.lock(), io::stdout())?;

	Ok(())
}
