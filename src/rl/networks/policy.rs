//! Per-role policy state: actor and critic bundled as one burn module.
//!
//! Inference runs on the plain ndarray backend (`PolicyNet::valid()`),
//! gradient updates on the autodiff wrapper around it.

use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use burn::tensor::activation::tanh;
use burn::tensor::Distribution;

use super::actor::Actor;
use super::critic::Critic;
use crate::error::{Result, TrainerError};
use crate::rl::core::{BridgeAction, Dims, ACTION_DIM};

/// Backend used for action sampling and value reads
pub type InferenceBackend = NdArray;

/// Backend used for gradient updates
pub type TrainingBackend = Autodiff<NdArray>;

/// Actions are clipped to this magnitude before `atanh`
const ATANH_LIMIT: f32 = 0.999;

/// Keeps the tanh Jacobian correction finite at |a| = 1
const SQUASH_EPS: f32 = 1e-6;

/// 0.5 * ln(2π)
const HALF_LOG_TWO_PI: f32 = 0.918_938_5;

/// Actor-critic parameters for one role
#[derive(Module, Debug)]
pub struct PolicyNet<B: Backend> {
    pub actor: Actor<B>,
    pub critic: Critic<B>,
}

/// One sampled action with its credit-assignment bookkeeping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicySample {
    pub action: BridgeAction,
    pub log_prob: f32,
    pub value: f32,
}

/// Batched evaluation of stored actions under the current parameters
pub struct ActionEvaluation<B: Backend> {
    pub log_prob: Tensor<B, 1>,
    pub entropy: Tensor<B, 1>,
    pub value: Tensor<B, 1>,
}

impl<B: Backend> PolicyNet<B> {
    pub fn new(device: &B::Device, dims: Dims, hidden_dim: usize) -> Self {
        Self {
            actor: Actor::new(device, dims.obs_dim, dims.act_dim, hidden_dim),
            critic: Critic::new(device, dims.obs_dim, hidden_dim),
        }
    }

    /// Shape the parameters were built for
    pub fn dims(&self) -> Dims {
        Dims {
            obs_dim: self.actor.obs_dim(),
            act_dim: self.actor.act_dim(),
        }
    }

    /// Whether the parameters fit a configuration epoch
    pub fn matches(&self, dims: Dims, hidden_dim: usize) -> bool {
        self.dims() == dims
            && self.critic.obs_dim() == dims.obs_dim
            && self.actor.hidden_dim() == hidden_dim
            && self.critic.hidden_dim() == hidden_dim
    }

    /// Log-probability, entropy and value for a batch of `(obs, action)` pairs
    pub fn evaluate_actions(
        &self,
        obs: Tensor<B, 2>,
        actions: &[BridgeAction],
        device: &B::Device,
    ) -> ActionEvaluation<B> {
        let batch = actions.len();
        let (pre_tanh, correction) = squash_terms(actions);
        let pre_tanh = matrix::<B>(pre_tanh, batch, ACTION_DIM, device);
        let correction = vector::<B>(correction, device);

        let (mean, log_std) = self.actor.forward(obs.clone());
        let entropy = log_std
            .clone()
            .add_scalar(0.5 + HALF_LOG_TWO_PI)
            .sum_dim(1)
            .squeeze(1);
        let log_prob = gaussian_log_prob(mean, log_std, pre_tanh) - correction;
        let value = self.critic.value(obs);

        ActionEvaluation {
            log_prob,
            entropy,
            value,
        }
    }

    /// Draw an action for a single observation
    pub fn sample(&self, obs: &[f32], device: &B::Device) -> Result<PolicySample> {
        let (mean, log_std) = self.actor.forward(row::<B>(obs, device));
        let noise = Tensor::<B, 2>::random(mean.shape(), Distribution::Normal(0.0, 1.0), device);
        let squashed = to_vec(tanh(mean + log_std.exp() * noise))?;
        let action = BridgeAction::from_slice(&squashed);

        let (log_prob, value) = self.evaluate(obs, action, device)?;
        Ok(PolicySample {
            action,
            log_prob,
            value,
        })
    }

    /// Log-probability and value of a given action, computed offline
    pub fn evaluate(
        &self,
        obs: &[f32],
        action: BridgeAction,
        device: &B::Device,
    ) -> Result<(f32, f32)> {
        let eval = self.evaluate_actions(row::<B>(obs, device), &[action], device);
        Ok((first(eval.log_prob)?, first(eval.value)?))
    }

    /// Value estimate for a single observation
    pub fn value(&self, obs: &[f32], device: &B::Device) -> Result<f32> {
        first(self.critic.value(row::<B>(obs, device)))
    }
}

/// Pre-tanh actions (row-major) and the per-sample squash correction
fn squash_terms(actions: &[BridgeAction]) -> (Vec<f32>, Vec<f32>) {
    let mut pre_tanh = Vec::with_capacity(actions.len() * ACTION_DIM);
    let mut correction = Vec::with_capacity(actions.len());

    for action in actions {
        let mut sum = 0.0f32;
        for a in action.to_array() {
            pre_tanh.push(a.clamp(-ATANH_LIMIT, ATANH_LIMIT).atanh());
            let a = a.clamp(-1.0, 1.0);
            sum += (1.0 - a * a + SQUASH_EPS).ln();
        }
        correction.push(sum);
    }

    (pre_tanh, correction)
}

/// Diagonal Gaussian log density summed over action components
fn gaussian_log_prob<B: Backend>(
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 2>,
    x: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let z = (x - mean) / log_std.clone().exp();
    let per_dim = (z.clone() * z).mul_scalar(-0.5) - log_std;
    per_dim.sub_scalar(HALF_LOG_TWO_PI).sum_dim(1).squeeze(1)
}

/// Single observation as a `[1, obs_dim]` tensor
pub fn row<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 2> {
    matrix::<B>(values.to_vec(), 1, values.len(), device)
}

/// Row-major values as a `[rows, cols]` tensor
pub fn matrix<B: Backend>(
    values: Vec<f32>,
    rows: usize,
    cols: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values, [rows, cols]), device)
}

pub fn vector<B: Backend>(values: Vec<f32>, device: &B::Device) -> Tensor<B, 1> {
    let len = values.len();
    Tensor::from_data(TensorData::new(values, [len]), device)
}

pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| TrainerError::Tensor(format!("{:?}", e)))
}

/// First element of a tensor, typically a reduced scalar
pub fn first<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<f32> {
    to_vec(tensor)?
        .first()
        .copied()
        .ok_or_else(|| TrainerError::Tensor("empty tensor".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::module::AutodiffModule;

    fn device() -> <InferenceBackend as Backend>::Device {
        Default::default()
    }

    fn policy(obs_dim: usize) -> PolicyNet<InferenceBackend> {
        PolicyNet::new(&device(), Dims::new(obs_dim), 16)
    }

    #[test]
    fn test_dims_roundtrip() {
        let net = policy(12);
        assert_eq!(net.dims(), Dims::new(12));
        assert!(net.matches(Dims::new(12), 16));
        assert!(!net.matches(Dims::new(12), 32));
        assert!(!net.matches(Dims::new(10), 16));
    }

    #[test]
    fn test_sample_is_bounded_and_finite() {
        let net = policy(10);
        let obs = vec![0.25; 10];
        for _ in 0..20 {
            let sample = net.sample(&obs, &device()).unwrap();
            for a in sample.action.to_array() {
                assert!((-1.0..=1.0).contains(&a));
            }
            assert!(sample.log_prob.is_finite());
            assert!(sample.value.is_finite());
        }
    }

    #[test]
    fn test_offline_evaluation_matches_sample() {
        let net = policy(10);
        let obs = vec![0.5; 10];
        let sample = net.sample(&obs, &device()).unwrap();
        let (log_prob, value) = net.evaluate(&obs, sample.action, &device()).unwrap();
        assert_eq!(log_prob, sample.log_prob);
        assert_eq!(value, sample.value);
    }

    #[test]
    fn test_batch_evaluation_shapes() {
        let net = policy(4);
        let obs = matrix::<InferenceBackend>(vec![0.1; 12], 3, 4, &device());
        let actions = vec![BridgeAction::new(0.1, -0.2, 0.0); 3];
        let eval = net.evaluate_actions(obs, &actions, &device());
        assert_eq!(eval.log_prob.dims(), [3]);
        assert_eq!(eval.entropy.dims(), [3]);
        assert_eq!(eval.value.dims(), [3]);
    }

    #[test]
    fn test_saturated_action_log_prob_is_finite() {
        let net = policy(4);
        let (log_prob, _) = net
            .evaluate(&[0.0; 4], BridgeAction::new(1.0, -1.0, 1.0), &device())
            .unwrap();
        assert!(log_prob.is_finite());
    }

    #[test]
    fn test_training_module_valid_matches_inference() {
        let train: PolicyNet<TrainingBackend> = PolicyNet::new(&Default::default(), Dims::new(6), 8);
        let infer = train.valid();
        let obs = vec![0.3; 6];
        let a = first(train.critic.value(row::<TrainingBackend>(&obs, &Default::default()))).unwrap();
        let b = infer.value(&obs, &device()).unwrap();
        assert!((a - b).abs() < 1e-6);
    }
}
