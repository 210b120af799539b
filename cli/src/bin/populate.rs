//! Bulk population: record every file under the configured scan
//! directories as `active`, skipping paths already tracked.

use std::path::PathBuf;

use anyhow::Context;
use attic_core::{logging, Config, LifecycleEngine, RecordStore};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "attic-populate", version, about = "Seed the record store from the scan directories")]
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
	let engine = LifecycleEngine::new(store, dispatch.clone());

	let report = engine.populate(&config.scan_directories);
	tracing::dispatcher::with_default(&dispatch, || {
		tracing::info!(
			added = report.added,
			skipped = report.skipped,
			failed = report.failed,
			ignored = report.ignored,
			"population finished"
		);
	});

	Ok(())
}
