//! Reinforcement Learning Module
//!
//! Online PPO for the two roles of the pursuit game, using the Burn
//! framework.
//!
//! # Features
//!
//! - **Role Routing**: observations carry a seeker/hider flag at a fixed index
//! - **Action Space**: continuous 3-component action (move x, move z, aux)
//! - **Algorithms**: PPO with GAE-λ, KL early stop and rollback
//! - **Online Learning**: updates triggered as rollout buffers fill

pub mod algorithms;
pub mod config;
pub mod core;
pub mod memory;
pub mod networks;
pub mod training;

// Config exports
pub use config::{PPOConfig, TrainingConfig};

// Core exports
pub use core::{route_role, BridgeAction, Dims, PerRole, Role, ACTION_DIM, ROLE_FLAG_INDEX};

// Memory exports
pub use memory::{ActionCache, AgentKey, RoleBuffers, Transition};

// Training exports
pub use training::{Trainer, TransitionReport, UpdateSummary};
