//! Critic Network (Value Function)

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::tanh;

/// Value Critic (V-function)
///
/// Estimates the expected return from a state. Used for the GAE bootstrap
/// and the value loss.
#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    input: Linear<B>,
    hidden: Linear<B>,
    value_head: Linear<B>,
}

impl<B: Backend> Critic<B> {
    pub fn new(device: &B::Device, obs_dim: usize, hidden_dim: usize) -> Self {
        Self {
            input: LinearConfig::new(obs_dim, hidden_dim).init(device),
            hidden: LinearConfig::new(hidden_dim, hidden_dim).init(device),
            value_head: LinearConfig::new(hidden_dim, 1).init(device),
        }
    }

    /// Forward pass returning state value `[batch, 1]`
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = tanh(self.input.forward(obs));
        let x = tanh(self.hidden.forward(x));
        self.value_head.forward(x)
    }

    /// Get value as scalar per batch element
    pub fn value(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        self.forward(obs).squeeze(1)
    }

    pub fn obs_dim(&self) -> usize {
        self.input.weight.val().dims()[0]
    }

    pub fn hidden_dim(&self) -> usize {
        self.input.weight.val().dims()[1]
    }
}
