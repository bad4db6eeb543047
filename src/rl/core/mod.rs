//! Core RL abstractions
//!
//! Roles, actions and the dimensionality contract shared by inference and
//! learning.

pub mod action;
pub mod role;

pub use action::{BridgeAction, ACTION_DIM};
pub use role::{route_role, PerRole, Role, ROLE_FLAG_INDEX, ROLE_FLAG_THRESHOLD};

/// Observation/action shape of the active configuration epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dims {
    pub obs_dim: usize,
    pub act_dim: usize,
}

impl Dims {
    pub fn new(obs_dim: usize) -> Self {
        Self {
            obs_dim,
            act_dim: ACTION_DIM,
        }
    }
}
