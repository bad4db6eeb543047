//! Neural Network Architectures
//!
//! Actor and Critic networks for the clipped policy-gradient learner.

pub mod actor;
pub mod critic;
pub mod policy;

pub use actor::Actor;
pub use critic::Critic;
pub use policy::{
    ActionEvaluation, InferenceBackend, PolicyNet, PolicySample, TrainingBackend,
};
