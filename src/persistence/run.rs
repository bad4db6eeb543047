//! Run identity and directory layout.
//!
//! ```text
//! <logs_root>/
//!   latest_run.txt                 -> path of the active run directory
//!   runs/<approach>/<run_id>/
//!     metadata.json
//!     metrics.csv
//!     updates.jsonl
//!     checkpoints/<role>_<step>.mpk
//! ```

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{Result, TrainerError};

pub const METADATA_FILE: &str = "metadata.json";
pub const METRICS_FILE: &str = "metrics.csv";
pub const UPDATES_FILE: &str = "updates.jsonl";
pub const LATEST_RUN_FILE: &str = "latest_run.txt";
pub const CHECKPOINT_DIR: &str = "checkpoints";

/// Default run id for a start time
pub fn timestamp_run_id(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Identity and paths of the active run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub approach: String,
    pub started_at: DateTime<Utc>,
    pub logs_root: PathBuf,
    pub run_dir: PathBuf,
}

impl RunContext {
    /// Create the run layout, write the metadata snapshot and point
    /// `latest_run.txt` at the new run.
    ///
    /// Directory creation failures are fatal; metadata and pointer write
    /// failures are logged and ignored.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let started_at = Utc::now();
        let run_id = config
            .run
            .run_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| timestamp_run_id(started_at));
        let approach = config.run.approach.clone();
        let logs_root = config.run.logs_root.clone();
        let run_dir = logs_root.join("runs").join(&approach).join(&run_id);

        let ctx = Self {
            run_id,
            approach,
            started_at,
            logs_root,
            run_dir,
        };

        for dir in [&ctx.logs_root, &ctx.run_dir, &ctx.checkpoint_dir()] {
            fs::create_dir_all(dir).map_err(|e| TrainerError::persistence(dir, e))?;
        }

        let metadata = ctx.collect_metadata(config);
        if let Err(e) = ctx.write_metadata(&metadata) {
            warn!(error = %e, "failed to write run metadata");
        }
        if let Err(e) = ctx.write_latest_marker() {
            warn!(error = %e, "failed to update latest run pointer");
        }

        info!(
            run_id = %ctx.run_id,
            approach = %ctx.approach,
            dir = ?ctx.run_dir,
            "run initialized"
        );
        Ok(ctx)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.run_dir.join(CHECKPOINT_DIR)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.run_dir.join(METRICS_FILE)
    }

    pub fn updates_path(&self) -> PathBuf {
        self.run_dir.join(UPDATES_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.run_dir.join(METADATA_FILE)
    }

    pub fn latest_marker_path(&self) -> PathBuf {
        self.logs_root.join(LATEST_RUN_FILE)
    }

    /// Configuration snapshot, selected environment flags and platform
    pub fn collect_metadata(&self, config: &AppConfig) -> Value {
        let mut meta = Map::new();
        meta.insert("run_id".into(), json!(self.run_id));
        meta.insert("approach".into(), json!(self.approach));
        meta.insert("started_at".into(), json!(self.started_at.to_rfc3339()));
        meta.insert("batch_target".into(), json!(config.training.batch_target));
        meta.insert("gamma".into(), json!(config.ppo.gamma));
        meta.insert("lambda".into(), json!(config.ppo.gae_lambda));
        meta.insert(
            "config".into(),
            serde_json::to_value(config).unwrap_or(Value::Null),
        );

        let env = env_snapshot(&config.run.metadata_env_keys);
        if !env.is_empty() {
            meta.insert("env".into(), Value::Object(env));
        }

        meta.insert(
            "platform".into(),
            json!({
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
                "crate_version": env!("CARGO_PKG_VERSION"),
            }),
        );
        Value::Object(meta)
    }

    fn write_metadata(&self, metadata: &Value) -> Result<()> {
        let path = self.metadata_path();
        let body = serde_json::to_string_pretty(metadata)?;
        fs::write(&path, body).map_err(|e| TrainerError::persistence(&path, e))
    }

    fn write_latest_marker(&self) -> Result<()> {
        let path = self.latest_marker_path();
        fs::write(&path, format!("{}\n", self.run_dir.display()))
            .map_err(|e| TrainerError::persistence(&path, e))
    }
}

/// Values of the given environment keys that are set and non-empty
fn env_snapshot(keys: &[String]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| match std::env::var(key) {
            Ok(v) if !v.is_empty() => Some((key.clone(), Value::String(v))),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn config_in(root: &Path, run_id: Option<&str>) -> AppConfig {
        let mut config = AppConfig::default();
        config.run.logs_root = root.to_path_buf();
        config.run.run_id = run_id.map(str::to_string);
        config.run.approach = "selfplay".to_string();
        config
    }

    #[test]
    fn test_layout_and_pointer() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::open(&config_in(dir.path(), Some("r1"))).unwrap();
        assert_eq!(ctx.run_dir, dir.path().join("runs").join("selfplay").join("r1"));
        assert!(ctx.checkpoint_dir().is_dir());
        let pointer = fs::read_to_string(dir.path().join(LATEST_RUN_FILE)).unwrap();
        assert_eq!(PathBuf::from(pointer.trim()), ctx.run_dir);
    }

    #[test]
    fn test_metadata_contents() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::open(&config_in(dir.path(), Some("meta"))).unwrap();
        let raw = fs::read_to_string(ctx.metadata_path()).unwrap();
        let meta: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(meta["run_id"], "meta");
        assert_eq!(meta["approach"], "selfplay");
        assert_eq!(meta["batch_target"], 2048);
        assert!(meta["platform"]["os"].is_string());
        assert!(meta["config"]["ppo"].is_object());
    }

    #[test]
    fn test_timestamp_run_id() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::open(&config_in(dir.path(), None)).unwrap();
        assert_eq!(ctx.run_id.len(), "20240101_120000".len());
        assert_eq!(ctx.run_id, timestamp_run_id(ctx.started_at));
    }

    #[test]
    fn test_env_snapshot_skips_unset() {
        let keys = vec!["TAG_TRAINER_TEST_SURELY_UNSET_KEY".to_string()];
        assert!(env_snapshot(&keys).is_empty());
    }
}
