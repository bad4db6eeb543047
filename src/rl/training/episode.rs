//! Episode Aggregation
//!
//! Running per-episode statistics fed by transition ingestion and flushed
//! into one summary when the episode closes.

use serde_json::Value;

use crate::rl::core::{PerRole, Role};

/// Episode annotations a client may attach to a transition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeInfo {
    pub agent: Option<String>,
    pub distance_to_other: Option<f32>,
    pub time_elapsed: Option<f64>,
    pub winner: Option<String>,
    pub terminal_reason: Option<String>,
    pub episode: Option<i64>,
}

impl EpisodeInfo {
    /// Pick known fields out of a transition's `info` object.
    ///
    /// Ill-typed fields are ignored rather than rejected.
    pub fn from_json(info: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = info else {
            return Self::default();
        };
        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            agent: map.get("agent").and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            }),
            distance_to_other: map
                .get("distance_to_other")
                .and_then(Value::as_f64)
                .map(|d| d as f32),
            time_elapsed: map.get("time_elapsed").and_then(Value::as_f64),
            winner: text("winner"),
            terminal_reason: text("terminal_reason"),
            episode: map.get("episode").and_then(|v| {
                v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RoleEpisode {
    rewards: Vec<f32>,
    steps: usize,
    distances: Vec<f32>,
}

/// Per-role slice of a closed episode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleSummary {
    pub reward_sum: f32,
    pub reward_mean: f32,
    pub steps: usize,
    /// Mean reported distance, 0 when none was reported
    pub avg_distance: f32,
}

/// Closed episode, ready to be combined with learner diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    /// Sequence number of the flushed episode (1-based)
    pub index: u64,
    /// Client-reported id, or `index` when none was reported
    pub episode_id: i64,
    pub reward_sum: f32,
    pub reward_mean: f32,
    pub steps: usize,
    pub roles: PerRole<RoleSummary>,
    pub winner: String,
    pub terminal_reason: String,
    pub duration_sec: f64,
}

/// Running statistics of the current episode
#[derive(Debug, Default)]
pub struct EpisodeStats {
    roles: PerRole<RoleEpisode>,
    duration: f64,
    winner: Option<String>,
    terminal_reason: Option<String>,
    episode_id: Option<i64>,
    episodes_logged: u64,
}

impl EpisodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one ingested transition
    pub fn record(&mut self, role: Role, reward: f32, info: &EpisodeInfo) {
        let slot = self.roles.get_mut(role);
        slot.rewards.push(reward);
        slot.steps += 1;
        if let Some(d) = info.distance_to_other {
            slot.distances.push(d);
        }
        if let Some(t) = info.time_elapsed {
            self.duration = self.duration.max(t);
        }
        if self.winner.is_none() {
            self.winner = info.winner.clone();
        }
        if self.terminal_reason.is_none() {
            self.terminal_reason = info.terminal_reason.clone();
        }
        if self.episode_id.is_none() {
            self.episode_id = info.episode;
        }
    }

    /// Samples recorded this episode across both roles
    pub fn total_samples(&self) -> usize {
        self.roles.iter().map(|(_, r)| r.rewards.len()).sum()
    }

    pub fn episodes_logged(&self) -> u64 {
        self.episodes_logged
    }

    /// Close the episode and reset. `None` when nothing was recorded.
    pub fn flush(&mut self) -> Option<EpisodeSummary> {
        let total = self.total_samples();
        if total == 0 {
            return None;
        }
        self.episodes_logged += 1;

        let summarize = |r: &RoleEpisode| {
            let reward_sum: f32 = r.rewards.iter().sum();
            RoleSummary {
                reward_sum,
                reward_mean: mean(&r.rewards),
                steps: r.steps,
                avg_distance: mean(&r.distances),
            }
        };
        let roles = PerRole::new(summarize(&self.roles.seeker), summarize(&self.roles.hider));
        let reward_sum = roles.seeker.reward_sum + roles.hider.reward_sum;
        let steps = roles.seeker.steps.max(roles.hider.steps);

        let summary = EpisodeSummary {
            index: self.episodes_logged,
            episode_id: self
                .episode_id
                .unwrap_or(self.episodes_logged as i64),
            reward_sum,
            reward_mean: reward_sum / total as f32,
            steps,
            roles,
            winner: self.winner.take().unwrap_or_default(),
            terminal_reason: self.terminal_reason.take().unwrap_or_default(),
            duration_sec: self.duration,
        };

        self.roles = PerRole::default();
        self.duration = 0.0;
        self.episode_id = None;
        Some(summary)
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}
