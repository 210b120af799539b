use std::path::Path;

use tracing::{error, info, warn};

use super::{scanner::walk_source, LifecycleEngine};
use crate::{db::StoreError, models::FileStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
	pub added: u64,
	/// Paths that already had a record.
	pub skipped: u64,
	pub failed: u64,
	/// Walk entries never considered: symlinks and entries that could not be read.
	pub ignored: u64,
}

impl LifecycleEngine {
	/// Track every file under `directories` as `active`.
	///
	/// Paths that already have a record are counted and left alone.
	pub fn populate<P: AsRef<Path>>(&self, directories: &[P]) -> PopulateReport {
		let _log = self.log_scope();
		let mut report = PopulateReport::default();

		for directory in directories {
			let directory = directory.as_ref();
			let (entries, ignored) = match walk_source(directory) {
				Ok(walked) => walked,
				Err(err) => {
					warn!(directory = %directory.display(), error = %err, "skipping directory");
					continue;
				}
			};
			report.ignored += ignored;

			info!(directory = %directory.display(), files = entries.len(), ignored, "populating from directory");
			for entry in entries {
				match self.store.create(&entry.path, FileStatus::Active, None) {
					Ok(_) => report.added += 1,
					Err(StoreError::Duplicate(_)) => report.skipped += 1,
					Err(err) => {
						error!(path = %entry.path.display(), error = %err, "failed to add record");
						report.failed += 1;
					}
				}
			}
		}

		info!(
			added = report.added,
			skipped = report.skipped,
			failed = report.failed,
			ignored = report.ignored,
			"population complete"
		);
		report
	}
}
