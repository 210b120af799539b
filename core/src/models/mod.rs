mod file_record;

pub use file_record::{parse_timestamp, FileRecord, FileStatus};
