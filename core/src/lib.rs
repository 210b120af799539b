//! File lifecycle tracking: files move between a live tree and an archive
//! directory based on inactivity and retention, with state kept in an
//! embedded record store.

pub mod config;
pub mod db;
pub mod engine;
pub mod logging;
pub mod models;

pub use config::{Config, ConfigError};
pub use db::{RecordStore, StoreError};
pub use engine::{LifecycleEngine, LifecycleError};
pub use models::{FileRecord, FileStatus};
