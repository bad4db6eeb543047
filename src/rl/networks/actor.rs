//! Actor Network (Policy)
//!
//! Gaussian policy head for the continuous bridge action. Samples are
//! squashed through `tanh` so every action component lands in [-1, 1].

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::tanh;

/// Bounds applied to the predicted log standard deviation
pub const LOG_STD_MIN: f32 = -4.0;
pub const LOG_STD_MAX: f32 = 1.5;

/// Actor network for continuous action spaces (PPO)
///
/// Two tanh hidden layers followed by a head producing `act_dim` means and
/// `act_dim` log standard deviations.
#[derive(Module, Debug)]
pub struct Actor<B: Backend> {
    input: Linear<B>,
    hidden: Linear<B>,
    head: Linear<B>,
}

impl<B: Backend> Actor<B> {
    pub fn new(device: &B::Device, obs_dim: usize, act_dim: usize, hidden_dim: usize) -> Self {
        Self {
            input: LinearConfig::new(obs_dim, hidden_dim).init(device),
            hidden: LinearConfig::new(hidden_dim, hidden_dim).init(device),
            head: LinearConfig::new(hidden_dim, act_dim * 2).init(device),
        }
    }

    /// Forward pass returning (mean, log_std), each `[batch, act_dim]`
    pub fn forward(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let x = tanh(self.input.forward(obs));
        let x = tanh(self.hidden.forward(x));
        let out = self.head.forward(x);

        let [batch, width] = out.dims();
        let act_dim = width / 2;
        let mean = out.clone().slice([0..batch, 0..act_dim]);
        let log_std = out
            .slice([0..batch, act_dim..width])
            .clamp(LOG_STD_MIN, LOG_STD_MAX);

        (mean, log_std)
    }

    /// Observation width the actor was built for
    pub fn obs_dim(&self) -> usize {
        self.input.weight.val().dims()[0]
    }

    pub fn hidden_dim(&self) -> usize {
        self.input.weight.val().dims()[1]
    }

    /// Action width the actor produces
    pub fn act_dim(&self) -> usize {
        self.head.weight.val().dims()[1] / 2
    }
}
