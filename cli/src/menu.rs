use std::io::{self, BufRead, Write};

use attic_core::{Config, LifecycleEngine};
use console::style;

const RULE: &str = "----------------------------------------";

/// Interactive loop. Returns when the user exits or input ends.
pub fn run<R: BufRead, W: Write>(
	engine: &LifecycleEngine,
	config: &Config,
	mut input: R,
	mut out: W,
) -> io::Result<()> {
	loop {
		print_menu(&mut out)?;
		let Some(entry) = prompt(&mut input, &mut out, "==> ")? else {
			break;
		};

		match entry.as_str() {
			"1" => scan_and_archive(engine, config, &mut out)?,
			"2" => purge(engine, config, &mut out)?,
			"3" => list(engine, &mut out)?,
			"4" => {
				let Some(id) = prompt_id(&mut input, &mut out, "Choose an archived file to restore: ")? else {
					continue;
				};
				match engine.restore(id, &config.archive_directory) {
					Ok(record) => writeln!(out, "Restored {} (id {id})", record.path.display())?,
					Err(err) => writeln!(out, "Restore failed: {err}")?,
				}
			}
			"5" => {
				let Some(id) = prompt_id(&mut input, &mut out, "Choose an archived file to delete: ")? else {
					continue;
				};
				match engine.force_delete(id, &config.archive_directory) {
					Ok(record) => writeln!(out, "Deleted {} (id {id})", record.path.display())?,
					Err(err) => writeln!(out, "Delete failed: {err}")?,
				}
			}
			"0" => break,
			_ => {
				writeln!(out, "{RULE}")?;
				writeln!(out, "Wrong entry. Please try again.")?;
				writeln!(out, "{RULE}")?;
			}
		}
	}

	writeln!(out, "Goodbye.")
}

fn print_menu<W: Write>(out: &mut W) -> io::Result<()> {
	writeln!(out, "{}", style("Welcome to the file manager:").bold())?;
	writeln!(out, "- To archive all inactive files enter 1")?;
	writeln!(out, "- To purge archived files past retention enter 2")?;
	writeln!(out, "- To list all the archived files enter 3")?;
	writeln!(out, "- To restore an archived file enter 4")?;
	writeln!(out, "- To delete an archived file enter 5")?;
	writeln!(out, "- To quit the program enter 0")
}

/// `None` on end of input.
fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, label: &str) -> io::Result<Option<String>> {
	write!(out, "{label}")?;
	out.flush()?;

	let mut line = String::new();
	if input.read_line(&mut line)? == 0 {
		return Ok(None);
	}
	Ok(Some(line.trim().to_string()))
}

fn prompt_id<R: BufRead, W: Write>(input: &mut R, out: &mut W, label: &str) -> io::Result<Option<i64>> {
	let Some(raw) = prompt(input, out, label)? else {
		return Ok(None);
	};
	match raw.parse::<i64>() {
		Ok(id) => Ok(Some(id)),
		Err(_) => {
			writeln!(out, "Invalid id: {raw:?}")?;
			Ok(None)
		}
	}
}

fn scan_and_archive<W: Write>(engine: &LifecycleEngine, config: &Config, out: &mut W) -> io::Result<()> {
	let report = engine.archive_inactive(
		&config.scan_directories,
		config.archive_threshold(),
		&config.archive_directory,
	);
	writeln!(out, "Archived {} file(s), {} failed.", report.archived(), report.failed)
}

fn purge<W: Write>(engine: &LifecycleEngine, config: &Config, out: &mut W) -> io::Result<()> {
	match engine.purge_expired(config.retention(), &config.archive_directory) {
		Ok(report) => writeln!(
			out,
			"Purged {} file(s); {} skipped with unreadable archive date, {} failed.",
			report.purged, report.malformed, report.failed
		),
		Err(err) => writeln!(out, "Purge failed: {err}"),
	}
}

fn list<W: Write>(engine: &LifecycleEngine, out: &mut W) -> io::Result<()> {
	let records = match engine.list_archived() {
		Ok(records) => records,
		Err(err) => return writeln!(out, "Listing failed: {err}"),
	};

	writeln!(out, "{RULE}")?;
	if records.is_empty() {
		writeln!(out, "No archived files.")?;
	}
	for record in records {
		writeln!(
			out,
			"{}\t\tid: {}\tarchived: {}",
			record.path.display(),
			record.id,
			record.archived_at.as_deref().unwrap_or("-")
		)?;
		writeln!(out, "{RULE}")?;
	}
	Ok(())
}
