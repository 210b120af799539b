use std::{fmt, path::PathBuf, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every file attic has ever tracked.
/// One record per path; `id` is the stable handle for restore and delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    pub path: PathBuf,
    pub status: FileStatus,
    /// Raw stored text. Kept unparsed so malformed values stay visible.
    pub archived_at: Option<String>,
}

impl FileRecord {
    /// When the record was archived, if the stored timestamp is readable.
    pub fn archived_time(&self) -> Option<DateTime<Utc>> {
        self.archived_at.as_deref().and_then(parse_timestamp)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    #[default]
    Active,
    Archived,
    Restored,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::Archived => "archived",
            FileStatus::Restored => "restored",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(FileStatus::Active),
            "archived" => Ok(FileStatus::Archived),
            "restored" => Ok(FileStatus::Restored),
            other => Err(other.to_string()),
        }
    }
}

/// Parse a stored timestamp.
/// RFC 3339 first, then naive ISO-8601 (no offset) read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn status_text_is_closed() {
        assert_eq!("archived".parse::<FileStatus>(), Ok(FileStatus::Archived));
        assert_eq!(FileStatus::Restored.to_string(), "restored");
        assert!("actived".parse::<FileStatus>().is_err());
        assert!("Archived".parse::<FileStatus>().is_err());
    }

    #[test]
    fn parses_rfc3339_and_naive_iso() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:30:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:30:00"), Some(expected));
        assert!(parse_timestamp("2024-03-01T12:30:00.123456").is_some());
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-45T99:00:00"), None);
    }

    #[test]
    fn archived_time_reads_stored_text() {
        let record = FileRecord {
            id: 1,
            path: PathBuf::from("/data/a.txt"),
            status: FileStatus::Archived,
            archived_at: Some("not a date".into()),
        };
        assert_eq!(record.archived_time(), None);
    }
}
