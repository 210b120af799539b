use std::{
	fs,
	path::{Path, PathBuf},
	time::SystemTime,
};

use chrono::TimeDelta;
use tracing::{error, info, warn};

use super::{
	mover::{archive_path, map_io_error, move_file, remove_if_present, touch},
	LifecycleEngine, LifecycleError,
};
use crate::models::{FileRecord, FileStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
	/// Inactive files outside the archive root.
	pub found: u64,
	/// Files moved whose record was created.
	pub created: u64,
	/// Files moved whose existing record was flipped back to archived.
	pub rearchived: u64,
	pub failed: u64,
}

impl ArchiveReport {
	pub fn archived(&self) -> u64 {
		self.created + self.rearchived
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
	pub purged: u64,
	pub retained: u64,
	/// Records skipped because `archived_at` is missing or unreadable.
	pub malformed: u64,
	pub failed: u64,
}

#[derive(Clone, Copy)]
enum Archived {
	Created(i64),
	Rearchived(i64),
}

impl LifecycleEngine {
	/// Move every inactive file into `archive_root` and record it as archived.
	///
	/// One file failing never stops the batch.
	pub fn archive_inactive<P: AsRef<Path>>(
		&self,
		directories: &[P],
		threshold: TimeDelta,
		archive_root: &Path,
	) -> ArchiveReport {
		let inactive = self.scan_inactive(directories, threshold);
		let _log = self.log_scope();

		let archive_root = std::path::absolute(archive_root).unwrap_or_else(|_| archive_root.to_path_buf());
		let mut report = ArchiveReport::default();

		for path in inactive {
			// Already sitting in the archive.
			if path.starts_with(&archive_root) {
				continue;
			}
			report.found += 1;

			match self.archive_one(&path, &archive_root) {
				Ok(Archived::Created(_)) => report.created += 1,
				Ok(Archived::Rearchived(_)) => report.rearchived += 1,
				Err(err) => {
					error!(path = %path.display(), error = %err, "failed to archive file");
					report.failed += 1;
				}
			}
		}

		info!(
			found = report.found,
			created = report.created,
			rearchived = report.rearchived,
			failed = report.failed,
			"archive pass complete"
		);
		report
	}

	fn archive_one(&self, path: &Path, archive_root: &Path) -> Result<Archived, LifecycleError> {
		fs::create_dir_all(archive_root).map_err(|e| map_io_error(e, archive_root))?;
		let dest = archive_path(archive_root, path)?;

		move_file(path, &dest)?;

		let now = self.clock.now();
		let outcome = self.store.get_by_path(path).and_then(|existing| match existing {
			Some(record) => self
				.store
				.set_status_at(record.id, FileStatus::Archived, now)
				.map(|r| Archived::Rearchived(r.id)),
			None => self.store.create(path, FileStatus::Archived, Some(now)).map(Archived::Created),
		});

		match outcome {
			Ok(archived) => {
				let (Archived::Created(id) | Archived::Rearchived(id)) = archived;
				info!(id, path = %path.display(), dest = %dest.display(), "archived file");
				Ok(archived)
			}
			Err(err) => {
				warn!(path = %path.display(), dest = %dest.display(), "file moved but record not updated");
				Err(err.into())
			}
		}
	}

	/// Permanently delete archived files held longer than `retention`.
	///
	/// Records with a missing or unreadable archive date are left alone.
	pub fn purge_expired(&self, retention: TimeDelta, archive_root: &Path) -> Result<PurgeReport, LifecycleError> {
		let _log = self.log_scope();
		let now = self.clock.now();
		let mut report = PurgeReport::default();

		for record in self.store.list_by_status(FileStatus::Archived)? {
			let Some(archived_at) = record.archived_time() else {
				warn!(
					id = record.id,
					path = %record.path.display(),
					archived_at = ?record.archived_at,
					"skipping record with unreadable archive date"
				);
				report.malformed += 1;
				continue;
			};

			if now - archived_at <= retention {
				report.retained += 1;
				continue;
			}

			match self.purge_one(&record, archive_root) {
				Ok(()) => report.purged += 1,
				Err(err) => {
					error!(id = record.id, path = %record.path.display(), error = %err, "failed to purge file");
					report.failed += 1;
				}
			}
		}

		info!(
			purged = report.purged,
			retained = report.retained,
			malformed = report.malformed,
			failed = report.failed,
			"purge pass complete"
		);
		Ok(report)
	}

	fn purge_one(&self, record: &FileRecord, archive_root: &Path) -> Result<(), LifecycleError> {
		let archived = archive_path(archive_root, &record.path)?;
		if remove_if_present(&archived)? {
			info!(path = %archived.display(), "deleted file from disk");
		} else {
			warn!(path = %archived.display(), "archived copy already absent");
		}
		self.store.delete(record.id)?;
		Ok(())
	}

	/// Move an archived file back to its original path and mark it restored.
	///
	/// Only archived records own an archive entry; any other status is refused.
	/// If the move fails the record is left untouched.
	pub fn restore(&self, id: i64, archive_root: &Path) -> Result<FileRecord, LifecycleError> {
		let _log = self.log_scope();
		let result = self.restore_inner(id, archive_root);
		if let Err(err) = &result {
			error!(id, error = %err, "restore failed");
		}
		result
	}

	fn restore_inner(&self, id: i64, archive_root: &Path) -> Result<FileRecord, LifecycleError> {
		let record = self.store.get_by_id(id)?;
		if record.status != FileStatus::Archived {
			return Err(LifecycleError::NotArchived { id, status: record.status });
		}
		let archived = archive_path(archive_root, &record.path)?;

		if let Some(parent) = record.path.parent() {
			fs::create_dir_all(parent).map_err(|e| map_io_error(e, parent))?;
		}
		move_file(&archived, &record.path)?;

		// Fresh mtime so the next scan does not archive it straight back.
		if let Err(err) = touch(&record.path, SystemTime::from(self.clock.now())) {
			warn!(path = %record.path.display(), error = %err, "could not refresh modification time");
		}

		let restored = self.store.set_status(id, FileStatus::Restored)?;
		info!(id, from = %archived.display(), to = %record.path.display(), "restored file");
		Ok(restored)
	}

	/// Drop a record and its archived copy, whether or not the copy still exists.
	///
	/// Only archived records own a file in the archive, so other statuses just
	/// lose their record.
	pub fn force_delete(&self, id: i64, archive_root: &Path) -> Result<FileRecord, LifecycleError> {
		let _log = self.log_scope();
		let result = self.force_delete_inner(id, archive_root);
		if let Err(err) = &result {
			error!(id, error = %err, "force delete failed");
		}
		result
	}

	fn force_delete_inner(&self, id: i64, archive_root: &Path) -> Result<FileRecord, LifecycleError> {
		let record = self.store.get_by_id(id)?;

		let mut archived: Option<PathBuf> = None;
		if record.status == FileStatus::Archived {
			let path = archive_path(archive_root, &record.path)?;
			if !remove_if_present(&path)? {
				warn!(id, path = %path.display(), "archived copy already absent");
			}
			archived = Some(path);
		}

		let removed = self.store.delete(id)?;
		info!(
			id,
			path = %removed.path.display(),
			archived = ?archived,
			"force-deleted record"
		);
		Ok(removed)
	}
}
