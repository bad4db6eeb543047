//! RL Configuration
//!
//! Configuration structs for the learning engine.

use serde::{Deserialize, Serialize};

/// PPO algorithm hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PPOConfig {
    /// Learning rate
    pub lr: f64,
    /// Discount factor (gamma)
    pub gamma: f32,
    /// GAE lambda
    pub gae_lambda: f32,
    /// PPO clip ratio (epsilon)
    pub clip_ratio: f32,
    /// Maximum gradient steps per update
    pub train_iters: usize,
    /// Target KL divergence; early stop at 1.5x, rollback above 5x
    pub target_kl: f32,
    /// Hidden layer width of the policy and value networks
    pub hidden_dim: usize,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            lr: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_ratio: 0.2,
            train_iters: 80,
            target_kl: 0.01,
            hidden_dim: 128,
        }
    }
}

impl PPOConfig {
    /// KL level that stops the gradient loop early
    pub fn early_stop_kl(&self) -> f32 {
        1.5 * self.target_kl
    }

    /// KL level above which a finished update is rolled back
    pub fn rollback_kl(&self) -> f32 {
        5.0 * self.target_kl
    }
}

/// Online training loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Per-role buffer size that triggers an update
    pub batch_target: usize,
    /// Checkpoints kept per role (<= 0 disables trimming)
    pub max_checkpoints: i64,
    /// Upper bound on outstanding cached inferences
    pub action_cache_capacity: usize,
    /// Skip loading pre-existing parameters on (re)configuration
    pub disable_policy_load: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_target: 2048,
            max_checkpoints: 8,
            action_cache_capacity: 4096,
            disable_policy_load: false,
        }
    }
}
