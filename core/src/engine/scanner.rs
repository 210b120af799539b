use std::{
	io,
	path::{Path, PathBuf},
	time::SystemTime,
};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::LifecycleEngine;

#[derive(Debug, Error)]
pub enum ScanError {
	#[error("scan directory does not exist: {0}")]
	SourcePathNotExists(String),

	#[error("scan path is not a directory: {0}")]
	SourcePathNotDir(String),
}

#[derive(Debug)]
pub(crate) struct FileEntry {
	pub path: PathBuf,
	pub modified: SystemTime,
}

impl LifecycleEngine {
	/// Every regular file under `directories` whose last modification is
	/// strictly older than `threshold`.
	///
	/// Missing directories and files that vanish mid-walk are skipped with a
	/// warning.
	pub fn scan_inactive<P: AsRef<Path>>(&self, directories: &[P], threshold: TimeDelta) -> Vec<PathBuf> {
		let _log = self.log_scope();
		let now = self.clock.now();
		let mut inactive = Vec::new();
		let mut skipped = 0u64;

		for directory in directories {
			let directory = directory.as_ref();
			let (entries, unread) = match walk_source(directory) {
				Ok(walked) => walked,
				Err(err) => {
					warn!(directory = %directory.display(), error = %err, "skipping scan directory");
					continue;
				}
			};
			skipped += unread;

			for entry in entries {
				if is_inactive(entry.modified, now, threshold) {
					debug!(path = %entry.path.display(), "inactive file");
					inactive.push(entry.path);
				}
			}
		}

		info!(
			count = inactive.len(),
			skipped,
			threshold_days = threshold.num_days(),
			"inactivity scan complete"
		);
		inactive
	}
}

/// `now - modified > threshold`. A file exactly at the threshold is still active.
pub(crate) fn is_inactive(modified: SystemTime, now: DateTime<Utc>, threshold: TimeDelta) -> bool {
	now - DateTime::<Utc>::from(modified) > threshold
}

/// Recursively list regular files under `root` with absolute paths.
///
/// Symlinks are neither followed nor listed. Entries that cannot be read are
/// counted as skipped.
pub(crate) fn walk_source(root: &Path) -> Result<(Vec<FileEntry>, u64), ScanError> {
	if !root.exists() {
		return Err(ScanError::SourcePathNotExists(root.display().to_string()));
	}
	if !root.is_dir() {
		return Err(ScanError::SourcePathNotDir(root.display().to_string()));
	}

	let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
	let mut entries = Vec::new();
	let mut skipped = 0u64;

	for result in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
		let entry = match result {
			Ok(e) => e,
			Err(err) => {
				warn_unreadable(err.path(), err.io_error());
				skipped += 1;
				continue;
			}
		};

		if !entry.file_type().is_file() {
			if entry.file_type().is_symlink() {
				skipped += 1;
			}
			continue;
		}

		let modified = match entry.metadata().map_err(io::Error::from).and_then(|m| m.modified()) {
			Ok(modified) => modified,
			Err(err) => {
				warn_unreadable(Some(entry.path()), Some(&err));
				skipped += 1;
				continue;
			}
		};

		entries.push(FileEntry { path: entry.into_path(), modified });
	}

	Ok((entries, skipped))
}

fn warn_unreadable(path: Option<&Path>, err: Option<&io::Error>) {
	let path = path.map(|p| p.display().to_string()).unwrap_or_default();
	match err {
		Some(err) if err.kind() == io::ErrorKind::NotFound => {
			warn!(path = %path, "file disappeared during scan");
		}
		Some(err) => warn!(path = %path, error = %err, "cannot read entry during scan"),
		None => warn!(path = %path, "cannot read entry during scan"),
	}
}
