//! Per-update event log, one JSON object per line.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::rl::algorithms::UpdateStats;
use crate::rl::core::Role;

/// One role update, accepted or rolled back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    /// Successful updates for this role, including this one if accepted
    pub role_updates: u64,
    /// Update rounds with at least one accepted role update
    pub global_updates: u64,
    #[serde(flatten)]
    pub stats: UpdateStats,
}

#[derive(Debug, Clone)]
pub struct UpdateLog {
    path: PathBuf,
}

impl UpdateLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &UpdateRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| TrainerError::persistence(&self.path, e))?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .map_err(|e| TrainerError::persistence(&self.path, e))
    }
}
