//! Action Cache
//!
//! Inference-time log-probability and value, kept per agent until the
//! matching transition report consumes them. Entries are bounded; overflow
//! evicts the oldest insertion, and an episode flush clears everything.

use std::collections::{HashMap, VecDeque};

use crate::rl::core::Role;

/// Key used when a client does not name its agent
pub const SINGLE_AGENT_KEY: &str = "__single__";

/// Identifies the agent an inference was made for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentKey(String);

impl AgentKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Singleton key for clients that report no agent id
    pub fn single() -> Self {
        Self(SINGLE_AGENT_KEY.to_string())
    }

    /// Key for an optional client-supplied id
    pub fn from_optional(id: Option<&str>) -> Self {
        match id {
            Some(id) if !id.is_empty() => Self::new(id),
            _ => Self::single(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Credit-assignment data captured at inference time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedInference {
    pub log_prob: f32,
    pub value: f32,
    pub role: Role,
}

/// Bounded per-agent cache of the last inference
#[derive(Debug)]
pub struct ActionCache {
    entries: HashMap<AgentKey, (u64, CachedInference)>,
    order: VecDeque<(u64, AgentKey)>,
    capacity: usize,
    next_seq: u64,
    evicted: u64,
}

impl ActionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            next_seq: 0,
            evicted: 0,
        }
    }

    /// Record an inference, replacing any earlier entry for the agent
    pub fn insert(&mut self, key: AgentKey, entry: CachedInference) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key.clone(), (seq, entry));
        self.order.push_back((seq, key));

        while self.entries.len() > self.capacity {
            let Some((seq, key)) = self.order.pop_front() else {
                break;
            };
            if matches!(self.entries.get(&key), Some((live, _)) if *live == seq) {
                self.entries.remove(&key);
                self.evicted += 1;
            }
        }
        self.compact();
    }

    /// Consume the entry for an agent
    pub fn pop(&mut self, key: &AgentKey) -> Option<CachedInference> {
        let entry = self.entries.remove(key).map(|(_, entry)| entry);
        self.compact();
        entry
    }

    pub fn contains(&self, key: &AgentKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped because the cache was full
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    // Stale order records (replaced or popped keys) are dropped once they
    // outnumber live entries.
    fn compact(&mut self) {
        if self.order.len() > self.entries.len() * 2 + 16 {
            let entries = &self.entries;
            self.order
                .retain(|(seq, key)| matches!(entries.get(key), Some((live, _)) if live == seq));
        }
    }
}
