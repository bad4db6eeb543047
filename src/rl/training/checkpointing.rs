//! Model Checkpointing
//!
//! Role- and step-indexed policy snapshots with bounded history, the
//! legacy single-policy mirror, and startup loading of pre-existing
//! parameters.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use tracing::{debug, info, warn};

use crate::error::{Result, TrainerError};
use crate::rl::core::{Dims, Role};
use crate::rl::networks::PolicyNet;

/// File extension written by the recorder
pub const CHECKPOINT_EXT: &str = "mpk";

/// Legacy single-policy file consumed by seeker-only clients
pub const LEGACY_POLICY_FILE: &str = "policy.mpk";

type Recorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Checkpoint file name for a role and update step
pub fn checkpoint_name(role: Role, step: u64) -> String {
    format!("{}_{:05}.{}", role.as_str(), step, CHECKPOINT_EXT)
}

/// Pre-existing per-role policy file name
pub fn role_policy_name(role: Role) -> String {
    format!("policy_{}.{}", role.as_str(), CHECKPOINT_EXT)
}

/// Writes and rotates per-role checkpoints
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    /// Directory for step-indexed checkpoints
    checkpoint_dir: PathBuf,
    /// Directory holding startup policies and the legacy mirror
    policy_dir: PathBuf,
    /// Checkpoints kept per role; `<= 0` keeps everything
    max_checkpoints: i64,
}

impl CheckpointManager {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        checkpoint_dir: P,
        policy_dir: Q,
        max_checkpoints: i64,
    ) -> Self {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();

        if !checkpoint_dir.exists() {
            if let Err(e) = fs::create_dir_all(&checkpoint_dir) {
                warn!("Failed to create checkpoint directory: {}", e);
            }
        }

        Self {
            checkpoint_dir,
            policy_dir: policy_dir.as_ref().to_path_buf(),
            max_checkpoints,
        }
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn checkpoint_path(&self, role: Role, step: u64) -> PathBuf {
        self.checkpoint_dir.join(checkpoint_name(role, step))
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.policy_dir.join(LEGACY_POLICY_FILE)
    }

    /// Persist a role's parameters for an update step, then trim history
    pub fn save<B: Backend>(&self, role: Role, step: u64, model: &PolicyNet<B>) -> Result<PathBuf> {
        let path = self.checkpoint_path(role, step);
        write_model(model, &path)?;
        debug!(role = %role, path = ?path, "saved checkpoint");

        let removed = self.trim(role)?;
        if removed > 0 {
            debug!(role = %role, removed, "trimmed old checkpoints");
        }
        Ok(path)
    }

    /// Mirror parameters to the fixed role-agnostic path
    pub fn save_legacy<B: Backend>(&self, model: &PolicyNet<B>) -> Result<PathBuf> {
        let path = self.legacy_path();
        write_model(model, &path)?;
        Ok(path)
    }

    /// Checkpoints for a role, oldest first (modification time, then name)
    pub fn list(&self, role: Role) -> Result<Vec<PathBuf>> {
        let prefix = format!("{}_", role.as_str());
        let entries = fs::read_dir(&self.checkpoint_dir)
            .map_err(|e| TrainerError::persistence(&self.checkpoint_dir, e))?;

        let mut files: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(CHECKPOINT_EXT) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, name, entry.path()));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(files.into_iter().map(|(_, _, path)| path).collect())
    }

    /// Remove the oldest checkpoints beyond the retention bound
    pub fn trim(&self, role: Role) -> Result<usize> {
        if self.max_checkpoints <= 0 {
            return Ok(0);
        }
        let files = self.list(role)?;
        let keep = self.max_checkpoints as usize;
        if files.len() <= keep {
            return Ok(0);
        }

        let mut removed = 0;
        for path in &files[..files.len() - keep] {
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove old checkpoint {:?}: {}", path, e),
            }
        }
        Ok(removed)
    }

    /// Pre-existing parameters for a role, if a compatible file exists.
    ///
    /// Looks for `policy_<role>.mpk`, then the legacy file for the seeker.
    /// Files that fail to load or do not fit `dims` are skipped.
    pub fn load_startup<B: Backend>(
        &self,
        role: Role,
        dims: Dims,
        hidden_dim: usize,
        device: &B::Device,
    ) -> Option<PolicyNet<B>> {
        let mut candidates = vec![self.policy_dir.join(role_policy_name(role))];
        if role == Role::Seeker {
            candidates.push(self.legacy_path());
        }

        let path = candidates.into_iter().find(|p| p.exists())?;
        match read_model::<B>(&path, dims, hidden_dim, device) {
            Ok(model) if model.matches(dims, hidden_dim) => {
                info!(role = %role, path = ?path, "loaded pre-existing policy");
                Some(model)
            }
            Ok(model) => {
                warn!(
                    role = %role,
                    path = ?path,
                    found = ?model.dims(),
                    expected = ?dims,
                    "ignoring pre-existing policy with a different shape"
                );
                None
            }
            Err(e) => {
                warn!(role = %role, path = ?path, error = %e, "policy load failed");
                None
            }
        }
    }
}

fn write_model<B: Backend>(model: &PolicyNet<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| TrainerError::persistence(parent, e))?;
        }
    }
    model
        .clone()
        .save_file(path.to_path_buf(), &Recorder::new())
        .map_err(|e| TrainerError::persistence(path, e))
}

fn read_model<B: Backend>(
    path: &Path,
    dims: Dims,
    hidden_dim: usize,
    device: &B::Device,
) -> Result<PolicyNet<B>> {
    PolicyNet::<B>::new(device, dims, hidden_dim)
        .load_file(path.to_path_buf(), &Recorder::new(), device)
        .map_err(|e| TrainerError::Recorder(format!("{:?}: {}", path, e)))
}
