//! Rollout Buffer
//!
//! Per-role, append-ordered storage of on-policy transitions. Append order is
//! the temporal order used by GAE. When several agents share a role their
//! transitions interleave in the same buffer; per-agent sequencing is not
//! reconstructed.

use serde::{Deserialize, Serialize};

use crate::rl::core::{BridgeAction, PerRole, Role};

/// A single transition in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Observation the action was taken from
    pub obs: Vec<f32>,
    /// Action taken
    pub action: BridgeAction,
    /// Reward received
    pub reward: f32,
    /// Whether the episode terminated for this agent
    pub done: bool,
    /// Log probability of the action under the data-collection policy
    pub log_prob: f32,
    /// Value estimate at `obs`
    pub value: f32,
    /// Value estimate at the next observation (0 when `done`)
    pub next_value: f32,
}

/// Column view of a batch, ready for tensor conversion
#[derive(Debug, Clone, Default)]
pub struct RolloutColumns {
    pub obs: Vec<f32>,
    pub actions: Vec<BridgeAction>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub log_probs: Vec<f32>,
    pub values: Vec<f32>,
    pub next_values: Vec<f32>,
}

/// Ordered transitions for one role
#[derive(Debug, Clone, Default)]
pub struct RoleBuffer {
    transitions: Vec<Transition>,
}

impl RoleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }

    /// Take every stored transition, leaving the buffer empty
    pub fn drain_all(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    /// Put transitions back in front of anything appended since they were taken
    pub fn restore(&mut self, mut batch: Vec<Transition>) {
        batch.append(&mut self.transitions);
        self.transitions = batch;
    }
}

/// Split a batch into columns; observations are flattened row-major
pub fn to_columns(batch: &[Transition]) -> RolloutColumns {
    let mut cols = RolloutColumns::default();
    for t in batch {
        cols.obs.extend_from_slice(&t.obs);
        cols.actions.push(t.action);
        cols.rewards.push(t.reward);
        cols.dones.push(t.done);
        cols.log_probs.push(t.log_prob);
        cols.values.push(t.value);
        cols.next_values.push(t.next_value);
    }
    cols
}

/// One buffer per role
#[derive(Debug, Clone, Default)]
pub struct RoleBuffers {
    buffers: PerRole<RoleBuffer>,
}

impl RoleBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: Role) -> &RoleBuffer {
        self.buffers.get(role)
    }

    pub fn get_mut(&mut self, role: Role) -> &mut RoleBuffer {
        self.buffers.get_mut(role)
    }

    /// Swap out a role's buffer if it holds at least `target` transitions
    pub fn take_if_ready(&mut self, role: Role, target: usize) -> Option<Vec<Transition>> {
        let buffer = self.buffers.get_mut(role);
        let batch = buffer.drain_all();
        if batch.len() >= target && !batch.is_empty() {
            Some(batch)
        } else {
            buffer.restore(batch);
            None
        }
    }

    pub fn clear(&mut self) {
        for role in Role::ALL {
            self.buffers.get_mut(role).clear();
        }
    }

    pub fn total_len(&self) -> usize {
        Role::ALL.iter().map(|r| self.buffers.get(*r).len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(reward: f32) -> Transition {
        Transition {
            obs: vec![reward; 3],
            action: BridgeAction::new(0.1, 0.2, 0.0),
            reward,
            done: false,
            log_prob: -1.0,
            value: 0.5,
            next_value: 0.4,
        }
    }

    #[test]
    fn test_take_if_ready_below_target_keeps_data() {
        let mut buffers = RoleBuffers::new();
        buffers.get_mut(Role::Seeker).push(transition(1.0));
        assert!(buffers.take_if_ready(Role::Seeker, 2).is_none());
        assert_eq!(buffers.get(Role::Seeker).len(), 1);
    }

    #[test]
    fn test_take_if_ready_swaps_out_full_buffer() {
        let mut buffers = RoleBuffers::new();
        for i in 0..3 {
            buffers.get_mut(Role::Hider).push(transition(i as f32));
        }
        let batch = buffers.take_if_ready(Role::Hider, 2).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].reward, 0.0);
        assert!(buffers.get(Role::Hider).is_empty());
        assert_eq!(buffers.total_len(), 0);
    }

    #[test]
    fn test_empty_buffer_never_ready() {
        let mut buffers = RoleBuffers::new();
        assert!(buffers.take_if_ready(Role::Seeker, 0).is_none());
    }

    #[test]
    fn test_restore_preserves_order() {
        let mut buffer = RoleBuffer::new();
        buffer.push(transition(1.0));
        let taken = buffer.drain_all();
        buffer.push(transition(2.0));
        buffer.restore(taken);
        let rewards: Vec<f32> = buffer.drain_all().iter().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![1.0, 2.0]);
    }

    #[test]
    fn test_columns() {
        let batch = vec![transition(1.0), transition(2.0)];
        let cols = to_columns(&batch);
        assert_eq!(cols.obs.len(), 6);
        assert_eq!(cols.rewards, vec![1.0, 2.0]);
        assert_eq!(cols.next_values, vec![0.4, 0.4]);
    }
}
