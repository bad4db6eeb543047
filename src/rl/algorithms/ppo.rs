//! Proximal Policy Optimization (PPO)
//!
//! Full-batch clipped-objective updates with a KL early stop and a
//! rollback guard. The learner consumes a parameter copy and only hands
//! it back when the finished update passes validation; otherwise the
//! caller keeps the parameters it already had.
//!
//! Adam moments are not carried between updates: every call starts a
//! fresh optimizer, so an update depends only on the parameters and the
//! batch it is given. Rolled-back updates therefore leave no optimizer
//! state behind either.

use std::fmt;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use super::gae::advantage_batch;
use crate::error::{Result, TrainerError};
use crate::rl::config::PPOConfig;
use crate::rl::memory::{to_columns, Transition};
use crate::rl::networks::policy::{first, matrix, vector, PolicyNet};

/// Why a finished update was discarded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstabilityReason {
    /// Policy or value loss was NaN or infinite
    NonFiniteLoss { policy_loss: f32, value_loss: f32 },
    /// Final approximate KL left the trust region
    KlExceeded { approx_kl: f32, limit: f32 },
}

impl fmt::Display for InstabilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstabilityReason::NonFiniteLoss {
                policy_loss,
                value_loss,
            } => write!(
                f,
                "non-finite loss (policy {}, value {})",
                policy_loss, value_loss
            ),
            InstabilityReason::KlExceeded { approx_kl, limit } => {
                write!(f, "approx KL {:.4} above {:.4}", approx_kl, limit)
            }
        }
    }
}

/// Diagnostics of one role update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStats {
    /// Transitions that contributed; 0 when rolled back
    pub batch_size: usize,
    /// Raw advantage mean
    pub adv_mean: f32,
    /// Raw advantage standard deviation
    pub adv_std: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub approx_kl: f32,
    /// Gradient steps attempted
    pub iterations: usize,
    pub rollback: Option<InstabilityReason>,
}

impl UpdateStats {
    pub fn rolled_back(&self) -> bool {
        self.rollback.is_some()
    }
}

/// Result of a learner pass
pub struct LearnerOutput<B: AutodiffBackend> {
    pub stats: UpdateStats,
    /// Updated parameters, present only when the update is accepted
    pub model: Option<PolicyNet<B>>,
}

/// Adam epsilon, matching the usual PyTorch default rather than burn's 1e-5
pub const ADAM_EPSILON: f32 = 1e-8;

/// Clipped policy-gradient learner
#[derive(Debug, Clone)]
pub struct PpoLearner {
    config: PPOConfig,
}

impl PpoLearner {
    pub fn new(config: PPOConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    fn optimizer_config(&self) -> AdamConfig {
        AdamConfig::new().with_epsilon(ADAM_EPSILON)
    }

    /// Run up to `train_iters` full-batch gradient steps on `model`.
    ///
    /// Every observation in `batch` must match the model's `obs_dim`.
    pub fn update<B: AutodiffBackend>(
        &self,
        mut model: PolicyNet<B>,
        batch: &[Transition],
        device: &B::Device,
    ) -> Result<LearnerOutput<B>>
    where
        PolicyNet<B>: AutodiffModule<B>,
    {
        let n = batch.len();
        if n == 0 {
            return Err(TrainerError::Internal("empty update batch".to_string()));
        }
        let dims = model.dims();
        if let Some(bad) = batch.iter().find(|t| t.obs.len() != dims.obs_dim) {
            return Err(TrainerError::ConfigMismatch {
                expected: dims.obs_dim,
                actual: bad.obs.len(),
            });
        }

        let cols = to_columns(batch);
        let adv = advantage_batch(
            &cols.rewards,
            &cols.values,
            &cols.next_values,
            &cols.dones,
            self.config.gamma,
            self.config.gae_lambda,
        );

        let obs = matrix::<B>(cols.obs, n, dims.obs_dim, device);
        let old_log_prob = vector::<B>(cols.log_probs, device);
        let returns = vector::<B>(adv.returns, device);
        let advantages = vector::<B>(adv.advantages, device);

        let mut optimizer = self.optimizer_config().init::<B, PolicyNet<B>>();
        let clip = self.config.clip_ratio;
        let mut stats = UpdateStats {
            batch_size: n,
            adv_mean: adv.raw_mean,
            adv_std: adv.raw_std,
            ..Default::default()
        };

        for _ in 0..self.config.train_iters {
            let eval = model.evaluate_actions(obs.clone(), &cols.actions, device);

            let ratio = (eval.log_prob.clone() - old_log_prob.clone()).exp();
            let clipped = ratio.clone().clamp(1.0 - clip, 1.0 + clip) * advantages.clone();
            let policy_loss = -(ratio * advantages.clone()).min_pair(clipped).mean();
            let value_loss = (eval.value - returns.clone()).powf_scalar(2.0).mean();
            let approx_kl = (old_log_prob.clone() - eval.log_prob).mean();

            stats.policy_loss = first(policy_loss.clone())?;
            stats.value_loss = first(value_loss.clone())?;
            stats.entropy = first(eval.entropy.mean())?;
            stats.approx_kl = first(approx_kl)?;
            stats.iterations += 1;

            if !stats.policy_loss.is_finite() || !stats.value_loss.is_finite() {
                break;
            }

            let grads = (policy_loss + value_loss).backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(self.config.lr, model, grads);

            if stats.approx_kl > self.config.early_stop_kl() {
                break;
            }
        }

        match self.validate(&stats) {
            Some(reason) => {
                stats.batch_size = 0;
                stats.rollback = Some(reason);
                Ok(LearnerOutput { stats, model: None })
            }
            None => Ok(LearnerOutput {
                stats,
                model: Some(model),
            }),
        }
    }

    /// Stability check on the final iteration's diagnostics
    pub fn validate(&self, stats: &UpdateStats) -> Option<InstabilityReason> {
        if !stats.policy_loss.is_finite() || !stats.value_loss.is_finite() {
            return Some(InstabilityReason::NonFiniteLoss {
                policy_loss: stats.policy_loss,
                value_loss: stats.value_loss,
            });
        }
        let limit = self.config.rollback_kl();
        if !stats.approx_kl.is_finite() || stats.approx_kl.abs() > limit {
            return Some(InstabilityReason::KlExceeded {
                approx_kl: stats.approx_kl,
                limit,
            });
        }
        None
    }
}
