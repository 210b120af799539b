//! Lifecycle engine: scanning, archiving, purging, restoring.
//!
//! Every operation runs to completion on the caller's thread. File moves are
//! not transactional with the record update: a crash between the two leaves
//! the file moved and the record stale (or the reverse).

mod lifecycle;
mod mover;
mod populate;
mod scanner;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{dispatcher::DefaultGuard, Dispatch};

use crate::{
	db::{RecordStore, StoreError},
	models::{FileRecord, FileStatus},
};

pub use lifecycle::{ArchiveReport, PurgeReport};
pub use populate::PopulateReport;
pub use scanner::ScanError;

#[derive(Debug, Error)]
pub enum LifecycleError {
	#[error("no record with id {0}")]
	NotFound(i64),

	#[error("record {id} is {status}, not archived")]
	NotArchived { id: i64, status: FileStatus },

	#[error("file not found: {0}")]
	SourceMissing(String),

	#[error("permission denied: {0}")]
	PermissionDenied(String),

	#[error("target already exists: {0}")]
	TargetExists(String),

	#[error("disk full: {0}")]
	DiskFull(String),

	#[error("copy verification failed for {path}: source={source_hash}, dest={dest_hash}")]
	CopyMismatch {
		path: String,
		source_hash: String,
		dest_hash: String,
	},

	#[error("I/O error: {0}")]
	Io(String),

	#[error("record store error: {0}")]
	Store(StoreError),
}

impl LifecycleError {
	/// Whether the failure happened on disk rather than in the store.
	pub fn is_filesystem(&self) -> bool {
		!matches!(
			self,
			LifecycleError::NotFound(_) | LifecycleError::NotArchived { .. } | LifecycleError::Store(_)
		)
	}
}

impl From<StoreError> for LifecycleError {
	fn from(err: StoreError) -> Self {
		match err {
			StoreError::NotFound(id) => LifecycleError::NotFound(id),
			other => LifecycleError::Store(other),
		}
	}
}

/// Source of "now" for age comparisons.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
	fn now(&self) -> DateTime<Utc> {
		self.0
	}
}

/// Drives file state transitions through the record store.
///
/// Owns the store, so dropping the engine closes it.
pub struct LifecycleEngine {
	store: RecordStore,
	clock: Box<dyn Clock>,
	dispatch: Dispatch,
}

impl LifecycleEngine {
	pub fn new(store: RecordStore, dispatch: Dispatch) -> Self {
		Self { store, clock: Box::new(SystemClock), dispatch }
	}

	pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
		self.clock = Box::new(clock);
		self
	}

	pub fn store(&self) -> &RecordStore {
		&self.store
	}

	pub fn list_archived(&self) -> Result<Vec<FileRecord>, LifecycleError> {
		Ok(self.store.list_by_status(FileStatus::Archived)?)
	}

	fn log_scope(&self) -> DefaultGuard {
		tracing::dispatcher::set_default(&self.dispatch)
	}
}
