//! Runtime configuration, read from an optional JSON file.
use crate::error::{CoreError, CoreResult};
use crate::retry::RetryConfig;
use crate::scheduler::{DEFAULT_DUE_PAGE_SIZE, SchedulePolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub database_path: PathBuf,
    pub policy: SchedulePolicy,
    pub retry: RetryConfig,
    pub due_page_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("db.sqlite3"),
            policy: SchedulePolicy::default(),
            retry: RetryConfig::default(),
            due_page_size: DEFAULT_DUE_PAGE_SIZE,
        }
    }
}

impl CoreConfig {
    /// Missing keys fall back to their defaults. The schedule policy is
    /// validated while parsing.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: CoreConfig = serde_json::from_str(&contents)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))?;

        if config.due_page_size == 0 {
            return Err(CoreError::Config("due_page_size must be at least 1".into()));
        }
        Ok(config)
    }
}
