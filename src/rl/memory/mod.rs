//! Experience Memory
//!
//! On-policy rollout storage and the inference cache used for credit
//! assignment.

pub mod action_cache;
pub mod rollout;

pub use action_cache::{ActionCache, AgentKey, CachedInference, SINGLE_AGENT_KEY};
pub use rollout::{to_columns, RoleBuffer, RoleBuffers, RolloutColumns, Transition};
