//! RL Algorithms
//!
//! Advantage estimation and the clipped policy-gradient update.

pub mod gae;
pub mod ppo;

pub use gae::{advantage_batch, compute_gae, normalize_advantages, AdvantageBatch};
pub use ppo::{InstabilityReason, LearnerOutput, PpoLearner, UpdateStats};
