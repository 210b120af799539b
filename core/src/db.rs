use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use surrealdb::engine::local::{Db, Mem, SurrealKv};
use surrealdb::types::SurrealValue;
use surrealdb::Surreal;
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{dispatcher::DefaultGuard, info, warn, Dispatch};

use crate::models::{FileRecord, FileStatus};

const NAMESPACE: &str = "attic";
const DATABASE: &str = "attic";

/// Upper bound on waiting for the embedded engine to flush and unlock on close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open record store at {location}: {reason}")]
    Connection { location: String, reason: String },

    #[error("a record already exists for {0}")]
    Duplicate(String),

    #[error("no record with id {0}")]
    NotFound(i64),

    #[error("unknown status in store: {0:?}")]
    InvalidStatus(String),

    #[error("path is not valid UTF-8: {0}")]
    InvalidPath(String),

    #[error("database error: {0}")]
    Db(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable mapping from file path to lifecycle record.
///
/// The embedded database is async; the store owns its runtime and blocks on
/// every query, so callers see plain synchronous calls. Dropping the store
/// shuts the database down and returns once its lock is released, so the
/// same location can be opened again straight away.
pub struct RecordStore {
    db: Surreal<Db>,
    rt: Runtime,
    dispatch: Dispatch,
    location: String,
}

#[derive(Debug, Clone, SurrealValue)]
struct FileRow {
    file_id: i64,
    path: String,
    status: String,
    archived_at: Option<String>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = StoreError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<FileStatus>().map_err(StoreError::InvalidStatus)?;
        Ok(FileRecord {
            id: row.file_id,
            path: row.path.into(),
            status,
            archived_at: row.archived_at,
        })
    }
}

impl RecordStore {
    /// Open (or create) the on-disk store and apply the schema.
    pub fn open(path: impl AsRef<Path>, dispatch: Dispatch) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let location = path.display().to_string();
        let _log = tracing::dispatcher::set_default(&dispatch);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| connection_error(&location, e))?;
        }

        let rt = Runtime::new().map_err(|e| connection_error(&location, e))?;
        let db = rt
            .block_on(async {
                let db = Surreal::new::<SurrealKv>(path).await.map_err(|e| e.to_string())?;
                prepare(db).await
            })
            .map_err(|e| connection_error(&location, e))?;

        info!(location = %location, "record store opened");
        Ok(Self { db, rt, dispatch, location })
    }

    /// Volatile store backed by the in-memory engine.
    pub fn in_memory(dispatch: Dispatch) -> StoreResult<Self> {
        let location = String::from("memory");
        let _log = tracing::dispatcher::set_default(&dispatch);

        let rt = Runtime::new().map_err(|e| connection_error(&location, e))?;
        let db = rt
            .block_on(async {
                let db = Surreal::new::<Mem>(()).await.map_err(|e| e.to_string())?;
                prepare(db).await
            })
            .map_err(|e| connection_error(&location, e))?;

        Ok(Self { db, rt, dispatch, location })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Insert a new record. Never touches an existing record for `path`.
    ///
    /// `archived_at` only applies to `Archived` records and defaults to now;
    /// other statuses are stored without a timestamp.
    pub fn create(
        &self,
        path: &Path,
        status: FileStatus,
        archived_at: Option<DateTime<Utc>>,
    ) -> StoreResult<i64> {
        let _log = self.log_scope();
        let key = path_key(path)?.to_string();

        if self.get_by_path(path)?.is_some() {
            return Err(StoreError::Duplicate(key));
        }

        let archived_at = match status {
            FileStatus::Archived => Some(archived_at.unwrap_or_else(Utc::now).to_rfc3339()),
            _ => None,
        };

        let id = self.rt.block_on(async {
            let mut response = self
                .db
                .query("UPSERT counter:file_record SET last = (last ?? 0) + 1 RETURN last")
                .await
                .map_err(db_error)?;
            let next: Option<i64> = response.take("last").map_err(db_error)?;
            let id = next.ok_or_else(|| StoreError::Db("id sequence returned nothing".into()))?;

            let query = match archived_at {
                Some(ref stamp) => self
                    .db
                    .query(
                        "CREATE file_record CONTENT {
                            file_id: $id,
                            path: $path,
                            status: $status,
                            archived_at: $archived_at,
                        }",
                    )
                    .bind(("archived_at", stamp.clone())),
                None => self.db.query(
                    "CREATE file_record CONTENT {
                        file_id: $id,
                        path: $path,
                        status: $status,
                    }",
                ),
            };

            query
                .bind(("id", id))
                .bind(("path", key.clone()))
                .bind(("status", status.as_str().to_string()))
                .await
                .map_err(db_error)?
                .check()
                .map_err(|e| write_error(e.to_string(), &key))?;

            Ok::<_, StoreError>(id)
        })?;

        info!(id, path = %key, status = %status, "record created");
        Ok(id)
    }

    pub fn get_by_id(&self, id: i64) -> StoreResult<FileRecord> {
        let rows = self.rt.block_on(async {
            let mut response = self
                .db
                .query("SELECT file_id, path, status, archived_at FROM file_record WHERE file_id = $id LIMIT 1")
                .bind(("id", id))
                .await
                .map_err(db_error)?;
            let rows: Vec<FileRow> = response.take(0).map_err(db_error)?;
            Ok::<_, StoreError>(rows)
        })?;

        rows.into_iter().next().ok_or(StoreError::NotFound(id))?.try_into()
    }

    /// Look a record up by path. `None` means the path is untracked.
    pub fn get_by_path(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        let key = path_key(path)?.to_string();
        let rows = self.rt.block_on(async {
            let mut response = self
                .db
                .query("SELECT file_id, path, status, archived_at FROM file_record WHERE path = $path LIMIT 1")
                .bind(("path", key))
                .await
                .map_err(db_error)?;
            let rows: Vec<FileRow> = response.take(0).map_err(db_error)?;
            Ok::<_, StoreError>(rows)
        })?;

        rows.into_iter().next().map(FileRecord::try_from).transpose()
    }

    pub fn list_by_status(&self, status: FileStatus) -> StoreResult<Vec<FileRecord>> {
        let rows = self.rt.block_on(async {
            let mut response = self
                .db
                .query(
                    "SELECT file_id, path, status, archived_at FROM file_record
                     WHERE status = $status ORDER BY file_id",
                )
                .bind(("status", status.as_str().to_string()))
                .await
                .map_err(db_error)?;
            let rows: Vec<FileRow> = response.take(0).map_err(db_error)?;
            Ok::<_, StoreError>(rows)
        })?;

        rows.into_iter().map(FileRecord::try_from).collect()
    }

    /// Transition a record. `Archived` stamps `archived_at` with the current
    /// time; every other status clears it.
    pub fn set_status(&self, id: i64, status: FileStatus) -> StoreResult<FileRecord> {
        self.set_status_at(id, status, Utc::now())
    }

    /// [`set_status`](Self::set_status) with an explicit archive time.
    pub fn set_status_at(&self, id: i64, status: FileStatus, now: DateTime<Utc>) -> StoreResult<FileRecord> {
        let _log = self.log_scope();
        let mut record = self.get_by_id(id)?;

        let archived_at = match status {
            FileStatus::Archived => Some(now.to_rfc3339()),
            _ => None,
        };

        self.rt.block_on(async {
            let query = match archived_at {
                Some(ref stamp) => self
                    .db
                    .query(
                        "UPDATE file_record SET status = $status, archived_at = $archived_at
                         WHERE file_id = $id RETURN NONE",
                    )
                    .bind(("archived_at", stamp.clone())),
                None => self.db.query(
                    "UPDATE file_record SET status = $status, archived_at = NONE
                     WHERE file_id = $id RETURN NONE",
                ),
            };

            query
                .bind(("id", id))
                .bind(("status", status.as_str().to_string()))
                .await
                .map_err(db_error)?
                .check()
                .map_err(db_error)?;
            Ok::<_, StoreError>(())
        })?;

        info!(id, status = %status, "record status updated");
        record.status = status;
        record.archived_at = archived_at;
        Ok(record)
    }

    /// Remove a record. Deleting an id twice fails the second time.
    pub fn delete(&self, id: i64) -> StoreResult<FileRecord> {
        let _log = self.log_scope();
        let record = self.get_by_id(id)?;

        self.rt.block_on(async {
            self.db
                .query("DELETE file_record WHERE file_id = $id RETURN NONE")
                .bind(("id", id))
                .await
                .map_err(db_error)?
                .check()
                .map_err(db_error)?;
            Ok::<_, StoreError>(())
        })?;

        info!(id, path = %record.path.display(), "record deleted");
        Ok(record)
    }

    /// Write a raw `archived_at` value, bypassing the status coupling.
    #[cfg(test)]
    pub(crate) fn overwrite_archived_at(&self, id: i64, raw: Option<&str>) -> StoreResult<()> {
        self.rt.block_on(async {
            let query = match raw {
                Some(raw) => self
                    .db
                    .query("UPDATE file_record SET archived_at = $raw WHERE file_id = $id RETURN NONE")
                    .bind(("raw", raw.to_string())),
                None => self
                    .db
                    .query("UPDATE file_record SET archived_at = NONE WHERE file_id = $id RETURN NONE"),
            };
            query
                .bind(("id", id))
                .await
                .map_err(db_error)?
                .check()
                .map_err(db_error)?;
            Ok(())
        })
    }

    fn log_scope(&self) -> DefaultGuard {
        tracing::dispatcher::set_default(&self.dispatch)
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        let _log = self.log_scope();

        // The engine stops the datastore from a background task once the last
        // connected handle is gone. Wait for every task on our runtime to end,
        // which includes that shutdown and the maintenance tasks it joins.
        drop(std::mem::replace(&mut self.db, Surreal::init()));
        let metrics = self.rt.metrics();
        let drained = self.rt.block_on(async {
            tokio::time::timeout(CLOSE_TIMEOUT, async {
                while metrics.num_alive_tasks() > 0 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
        });

        match drained {
            Ok(()) => info!(location = %self.location, "record store closed"),
            Err(_) => warn!(
                location = %self.location,
                pending_tasks = metrics.num_alive_tasks(),
                "record store did not shut down in time"
            ),
        }
    }
}

/// Select namespace/database and run migrations. DEFINE statements are idempotent.
async fn prepare(db: Surreal<Db>) -> Result<Surreal<Db>, String> {
    db.use_ns(NAMESPACE).use_db(DATABASE).await.map_err(|e| e.to_string())?;
    db.query(SCHEMA_V1)
        .await
        .map_err(|e| e.to_string())?
        .check()
        .map_err(|e| e.to_string())?;
    Ok(db)
}

fn path_key(path: &Path) -> StoreResult<&str> {
    path.to_str()
        .ok_or_else(|| StoreError::InvalidPath(path.to_string_lossy().into_owned()))
}

fn connection_error(location: &str, reason: impl ToString) -> StoreError {
    StoreError::Connection { location: location.to_string(), reason: reason.to_string() }
}

fn db_error(err: impl ToString) -> StoreError {
    StoreError::Db(err.to_string())
}

/// The unique path index is the last line of defence against duplicates.
fn write_error(message: String, path: &str) -> StoreError {
    if message.contains("idx_file_record_path") {
        StoreError::Duplicate(path.to_string())
    } else {
        StoreError::Db(message)
    }
}

const SCHEMA_V1: &str = "
    DEFINE TABLE OVERWRITE file_record SCHEMAFULL;
    DEFINE FIELD OVERWRITE file_id ON file_record TYPE int;
    DEFINE FIELD OVERWRITE path ON file_record TYPE string;
    DEFINE FIELD OVERWRITE status ON file_record TYPE string DEFAULT 'active'
        ASSERT $value IN ['active', 'archived', 'restored'];
    DEFINE FIELD OVERWRITE archived_at ON file_record TYPE option<string>;
    DEFINE INDEX OVERWRITE idx_file_record_id ON file_record FIELDS file_id UNIQUE;
    DEFINE INDEX OVERWRITE idx_file_record_path ON file_record FIELDS path UNIQUE;

    DEFINE TABLE OVERWRITE counter SCHEMALESS;
";

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::TimeZone;

    use super::*;
    use crate::engine::test_support::CapturedLogs;

    fn store() -> RecordStore {
        RecordStore::in_memory(Dispatch::none()).unwrap()
    }

    #[test]
    fn create_then_read_back() {
        let store = store();
        let path = Path::new("/test/path/file1.txt");

        let id = store.create(path, FileStatus::Active, None).unwrap();
        let record = store.get_by_id(id).unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.path, PathBuf::from("/test/path/file1.txt"));
        assert_eq!(record.status, FileStatus::Active);
        assert_eq!(record.archived_at, None);
        assert_eq!(store.get_by_path(path).unwrap(), Some(record));
    }

    #[test]
    fn ids_are_distinct_and_not_reused() {
        let store = store();
        let a = store.create(Path::new("/a"), FileStatus::Active, None).unwrap();
        let b = store.create(Path::new("/b"), FileStatus::Active, None).unwrap();
        assert_ne!(a, b);

        store.delete(b).unwrap();
        let c = store.create(Path::new("/c"), FileStatus::Active, None).unwrap();
        assert!(c > b);
    }

    #[test]
    fn duplicate_path_is_rejected_and_original_kept() {
        let store = store();
        let path = Path::new("/path/unique_file.txt");
        let id = store.create(path, FileStatus::Active, None).unwrap();

        let err = store.create(path, FileStatus::Archived, None).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref p) if p == "/path/unique_file.txt"));

        let record = store.get_by_id(id).unwrap();
        assert_eq!(record.status, FileStatus::Active);
        assert_eq!(record.archived_at, None);
        assert_eq!(store.list_by_status(FileStatus::Archived).unwrap().len(), 0);
    }

    #[test]
    fn create_couples_timestamp_to_status() {
        let store = store();
        let archived = store.create(Path::new("/x/archived"), FileStatus::Archived, None).unwrap();
        let active = store.create(Path::new("/x/active"), FileStatus::Active, Some(Utc::now())).unwrap();

        assert!(store.get_by_id(archived).unwrap().archived_time().is_some());
        assert_eq!(store.get_by_id(active).unwrap().archived_at, None);
    }

    #[test]
    fn unknown_path_is_absent_not_an_error() {
        let store = store();
        assert_eq!(store.get_by_path(Path::new("/nowhere")).unwrap(), None);
    }

    #[test]
    fn list_by_status_filters() {
        let store = store();
        store.create(Path::new("/path/file_active.txt"), FileStatus::Active, None).unwrap();
        store.create(Path::new("/path/file_archived.txt"), FileStatus::Archived, Some(Utc::now())).unwrap();
        store.create(Path::new("/path/another_active.txt"), FileStatus::Active, None).unwrap();

        assert_eq!(store.list_by_status(FileStatus::Active).unwrap().len(), 2);
        let archived = store.list_by_status(FileStatus::Archived).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].path, PathBuf::from("/path/file_archived.txt"));
        assert!(store.list_by_status(FileStatus::Restored).unwrap().is_empty());
    }

    #[test]
    fn set_status_keeps_archived_at_in_step() {
        let store = store();
        let id = store.create(Path::new("/path/to_update.txt"), FileStatus::Active, None).unwrap();

        let archived = store.set_status(id, FileStatus::Archived).unwrap();
        assert_eq!(archived.status, FileStatus::Archived);
        assert!(store.get_by_id(id).unwrap().archived_time().is_some());

        let restored = store.set_status(id, FileStatus::Restored).unwrap();
        assert_eq!(restored.archived_at, None);
        let stored = store.get_by_id(id).unwrap();
        assert_eq!(stored.status, FileStatus::Restored);
        assert_eq!(stored.archived_at, None);

        store.set_status(id, FileStatus::Active).unwrap();
        assert_eq!(store.get_by_id(id).unwrap().archived_at, None);
    }

    #[test]
    fn set_status_on_missing_id() {
        let store = store();
        assert!(matches!(store.set_status(42, FileStatus::Archived), Err(StoreError::NotFound(42))));
    }

    #[test]
    fn delete_is_not_idempotent() {
        let store = store();
        let id = store.create(Path::new("/path/to_delete.txt"), FileStatus::Active, None).unwrap();

        let removed = store.delete(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(matches!(store.get_by_id(id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(id), Err(StoreError::NotFound(_))));
        assert_eq!(store.get_by_path(Path::new("/path/to_delete.txt")).unwrap(), None);
    }

    #[test]
    fn set_status_at_uses_the_given_time() {
        let store = store();
        let id = store.create(Path::new("/path/stamped.txt"), FileStatus::Active, None).unwrap();
        let at = Utc.with_ymd_and_hms(2031, 5, 6, 7, 8, 9).unwrap();

        let record = store.set_status_at(id, FileStatus::Archived, at).unwrap();

        assert_eq!(record.archived_time(), Some(at));
        assert_eq!(store.get_by_id(id).unwrap().archived_time(), Some(at));
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let location = tmp.path().join("state").join("attic.db");

        let id = {
            let store = RecordStore::open(&location, Dispatch::none()).unwrap();
            store.create(Path::new("/data/report.pdf"), FileStatus::Active, None).unwrap()
        };

        let store = RecordStore::open(&location, Dispatch::none()).unwrap();
        let record = store.get_by_id(id).unwrap();
        assert_eq!(record.path, PathBuf::from("/data/report.pdf"));
    }

    #[test]
    fn drop_releases_the_lock_before_returning() {
        let tmp = tempfile::tempdir().unwrap();
        let location = tmp.path().join("attic.db");
        let logs = CapturedLogs::default();

        for round in 0..3 {
            let store = RecordStore::open(&location, logs.dispatch()).unwrap();
            store.create(&PathBuf::from(format!("/data/{round}.txt")), FileStatus::Active, None).unwrap();
        }

        let store = RecordStore::open(&location, Dispatch::none()).unwrap();
        assert_eq!(store.list_by_status(FileStatus::Active).unwrap().len(), 3);
        assert_eq!(logs.contents().matches("record store closed").count(), 3);
        assert!(!logs.contents().contains("did not shut down in time"));
    }
}
