use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("config file {path} is not valid TOML: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Location of the record store.
    pub database_name: PathBuf,
    pub log_file: PathBuf,
    pub scan_directories: Vec<PathBuf>,
    pub archive_directory: PathBuf,
    pub days_until_archive: u32,
    pub days_until_delete: u32,
}

const PATH_KEYS: [&str; 3] = ["database_name", "log_file", "archive_directory"];
const DAY_KEYS: [&str; 2] = ["days_until_archive", "days_until_delete"];

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, "<inline>")
    }

    fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = text.parse().map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

        let problems = validate(&table);
        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid(vec![e.to_string()]))
    }

    /// Inactivity threshold for scanning.
    pub fn archive_threshold(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.days_until_archive))
    }

    /// How long archived files are kept before purge.
    pub fn retention(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.days_until_delete))
    }
}

/// Every missing or mistyped key, not just the first.
fn validate(table: &toml::Table) -> Vec<String> {
    let mut problems = Vec::new();

    for key in PATH_KEYS {
        match table.get(key) {
            None => problems.push(format!("missing key `{key}`")),
            Some(toml::Value::String(s)) if s.trim().is_empty() => {
                problems.push(format!("`{key}` must not be empty"))
            }
            Some(toml::Value::String(_)) => {}
            Some(other) => problems.push(format!("`{key}` must be a string, found {}", other.type_str())),
        }
    }

    match table.get("scan_directories") {
        None => problems.push("missing key `scan_directories`".to_string()),
        Some(toml::Value::Array(dirs)) if dirs.is_empty() => {
            problems.push("`scan_directories` must list at least one directory".to_string())
        }
        Some(toml::Value::Array(dirs)) => {
            for (i, dir) in dirs.iter().enumerate() {
                match dir {
                    toml::Value::String(s) if !s.trim().is_empty() => {}
                    toml::Value::String(_) => problems.push(format!("`scan_directories[{i}]` must not be empty")),
                    other => problems.push(format!(
                        "`scan_directories[{i}]` must be a string, found {}",
                        other.type_str()
                    )),
                }
            }
        }
        Some(other) => problems.push(format!(
            "`scan_directories` must be an array of strings, found {}",
            other.type_str()
        )),
    }

    for key in DAY_KEYS {
        match table.get(key) {
            None => problems.push(format!("missing key `{key}`")),
            Some(toml::Value::Integer(days)) if u32::try_from(*days).is_err() => {
                problems.push(format!("`{key}` must be a non-negative number of days, found {days}"))
            }
            Some(toml::Value::Integer(_)) => {}
            Some(other) => problems.push(format!("`{key}` must be an integer, found {}", other.type_str())),
        }
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        database_name = "state/attic.db"
        log_file = "logs/attic.log"
        scan_directories = ["./scan", "/srv/shared"]
        archive_directory = "./archive"
        days_until_archive = 10
        days_until_delete = 20
    "#;

    #[test]
    fn loads_valid_config() {
        let config = Config::from_toml_str(VALID).unwrap();

        assert_eq!(config.database_name, PathBuf::from("state/attic.db"));
        assert_eq!(config.log_file, PathBuf::from("logs/attic.log"));
        assert_eq!(
            config.scan_directories,
            vec![PathBuf::from("./scan"), PathBuf::from("/srv/shared")]
        );
        assert_eq!(config.archive_directory, PathBuf::from("./archive"));
        assert_eq!(config.archive_threshold(), TimeDelta::days(10));
        assert_eq!(config.retention(), TimeDelta::days(20));
    }

    #[test]
    fn loads_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, VALID).unwrap();

        assert_eq!(Config::load(&path).unwrap(), Config::from_toml_str(VALID).unwrap());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load("/tmp/attic_no_such_config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = Config::from_toml_str("database_name = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn lists_every_problem_at_once() {
        let err = Config::from_toml_str(
            r#"
            database_name = 42
            scan_directories = []
            days_until_archive = "three"
            days_until_delete = -1
            "#,
        )
        .unwrap_err();

        let ConfigError::Invalid(problems) = err else {
            panic!("expected Invalid, got {err:?}");
        };
        assert_eq!(problems.len(), 6, "{problems:?}");
        let joined = problems.join("\n");
        assert!(joined.contains("`database_name` must be a string"));
        assert!(joined.contains("missing key `log_file`"));
        assert!(joined.contains("missing key `archive_directory`"));
        assert!(joined.contains("`scan_directories` must list at least one directory"));
        assert!(joined.contains("`days_until_archive` must be an integer"));
        assert!(joined.contains("`days_until_delete` must be a non-negative number of days"));
    }

    #[test]
    fn rejects_non_string_scan_entries() {
        let text = VALID.replace(r#"["./scan", "/srv/shared"]"#, r#"["./scan", 7]"#);
        let err = Config::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("`scan_directories[1]` must be a string"));
    }

    #[test]
    fn zero_days_is_allowed() {
        let text = VALID.replace("days_until_archive = 10", "days_until_archive = 0");
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.archive_threshold(), TimeDelta::zero());
    }
}
