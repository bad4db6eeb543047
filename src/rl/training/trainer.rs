//! Online Trainer
//!
//! Context object shared by every connection. It serves actions, ingests
//! transitions, closes episodes and runs role updates.
//!
//! Locking: `shared` guards buffers, the action cache, episode statistics
//! and counters; `policies` guards the per-role parameters. When both are
//! needed `shared` is taken first. Gradient computation runs on a copy of
//! the parameters with neither lock held, and the result is swapped in
//! afterwards only if it is still for the current configuration epoch.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use burn::module::AutodiffModule;
use burn::prelude::Backend;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::checkpointing::CheckpointManager;
use super::episode::{EpisodeInfo, EpisodeStats, EpisodeSummary};
use crate::config::AppConfig;
use crate::error::{Result, TrainerError};
use crate::persistence::{MetricsLog, MetricsRow, RunContext, UpdateLog, UpdateRecord};
use crate::rl::algorithms::{LearnerOutput, PpoLearner, UpdateStats};
use crate::rl::config::{PPOConfig, TrainingConfig};
use crate::rl::core::{route_role, BridgeAction, Dims, PerRole, Role, ROLE_FLAG_INDEX};
use crate::rl::memory::{ActionCache, AgentKey, CachedInference, RoleBuffers, Transition};
use crate::rl::networks::{InferenceBackend, PolicyNet, TrainingBackend};

type Device = <InferenceBackend as Backend>::Device;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where an action came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSource {
    Policy,
    /// No parameters for the role yet, or the observation is too short to
    /// carry the role flag; uniform random planar move
    Fallback,
}

/// Action served to a client
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionDecision {
    pub action: BridgeAction,
    pub log_prob: f32,
    pub value: f32,
    pub role: Role,
    pub source: ActionSource,
}

impl ActionDecision {
    fn fallback(role: Role) -> Self {
        Self {
            action: BridgeAction::random_fallback(),
            log_prob: 0.0,
            value: 0.0,
            role,
            source: ActionSource::Fallback,
        }
    }
}

/// A transition as reported by the game client
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionReport {
    pub obs: Vec<f32>,
    pub action: BridgeAction,
    pub reward: f32,
    pub done: bool,
    pub next_obs: Option<Vec<f32>>,
    pub info: EpisodeInfo,
}

/// Result of ingesting one message worth of transitions
#[derive(Debug, Default)]
pub struct IngestReport {
    pub stored: usize,
    /// Row written for an episode closed by this message
    pub metrics: Option<MetricsRow>,
    /// Rejected transitions and sink failures
    pub errors: Vec<TrainerError>,
}

/// One role's update attempt
#[derive(Debug, Clone)]
pub struct RoleUpdate {
    pub role: Role,
    pub stats: UpdateStats,
    /// Successful updates for the role after this attempt
    pub role_updates: u64,
    pub checkpoint: Option<PathBuf>,
}

/// Outcome of one `maybe_update` round
#[derive(Debug, Default)]
pub struct UpdateSummary {
    pub outcomes: Vec<RoleUpdate>,
    pub errors: Vec<TrainerError>,
    /// Another round was already running
    pub busy: bool,
    /// Results were computed for a configuration that no longer exists
    pub stale: bool,
}

impl UpdateSummary {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty() && self.errors.is_empty() && !self.stale
    }

    pub fn accepted(&self) -> impl Iterator<Item = &RoleUpdate> {
        self.outcomes.iter().filter(|o| !o.stats.rolled_back())
    }
}

/// Batch-size-weighted diagnostics of the last round with accepted updates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoundDiagnostics {
    pub adv_mean: f32,
    pub adv_std: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
}

impl RoundDiagnostics {
    fn weighted(stats: &[&UpdateStats]) -> Option<Self> {
        let total: usize = stats.iter().map(|s| s.batch_size).sum();
        if total == 0 {
            return None;
        }
        let avg = |f: fn(&UpdateStats) -> f32| {
            stats.iter().map(|s| f(s) * s.batch_size as f32).sum::<f32>() / total as f32
        };
        Some(Self {
            adv_mean: avg(|s| s.adv_mean),
            adv_std: avg(|s| s.adv_std),
            policy_loss: avg(|s| s.policy_loss),
            value_loss: avg(|s| s.value_loss),
        })
    }
}

/// File sinks of a run
#[derive(Debug, Clone)]
pub struct TrainerSinks {
    pub checkpoints: CheckpointManager,
    pub metrics: MetricsLog,
    pub updates: UpdateLog,
}

impl TrainerSinks {
    pub fn open(run: &RunContext, config: &AppConfig) -> Result<Self> {
        Ok(Self {
            checkpoints: CheckpointManager::new(
                run.checkpoint_dir(),
                &config.run.policy_dir,
                config.training.max_checkpoints,
            ),
            metrics: MetricsLog::open(run.metrics_path())?,
            updates: UpdateLog::new(run.updates_path()),
        })
    }
}

struct SharedState {
    dims: Option<Dims>,
    epoch: u64,
    buffers: RoleBuffers,
    cache: ActionCache,
    episode: EpisodeStats,
    role_updates: PerRole<u64>,
    global_updates: u64,
    last_round: RoundDiagnostics,
}

struct PolicySlot {
    train: PolicyNet<TrainingBackend>,
    infer: PolicyNet<InferenceBackend>,
}

impl PolicySlot {
    fn new(train: PolicyNet<TrainingBackend>) -> Self {
        let infer = train.valid();
        Self { train, infer }
    }
}

#[derive(Default)]
struct PolicyStore {
    epoch: u64,
    dims: Option<Dims>,
    slots: PerRole<Option<PolicySlot>>,
}

/// Online PPO trainer for both roles
pub struct Trainer {
    ppo: PPOConfig,
    training: TrainingConfig,
    learner: PpoLearner,
    device: Device,
    shared: Mutex<SharedState>,
    policies: Mutex<PolicyStore>,
    update_gate: Mutex<()>,
    sinks: Option<TrainerSinks>,
}

impl Trainer {
    pub fn new(ppo: PPOConfig, training: TrainingConfig, sinks: Option<TrainerSinks>) -> Self {
        let shared = SharedState {
            dims: None,
            epoch: 0,
            buffers: RoleBuffers::new(),
            cache: ActionCache::new(training.action_cache_capacity),
            episode: EpisodeStats::new(),
            role_updates: PerRole::default(),
            global_updates: 0,
            last_round: RoundDiagnostics::default(),
        };

        Self {
            learner: PpoLearner::new(ppo.clone()),
            ppo,
            training,
            device: Device::default(),
            shared: Mutex::new(shared),
            policies: Mutex::new(PolicyStore::default()),
            update_gate: Mutex::new(()),
            sinks,
        }
    }

    /// Trainer writing into an opened run
    pub fn for_run(config: &AppConfig, run: &RunContext) -> Result<Self> {
        let sinks = TrainerSinks::open(run, config)?;
        Ok(Self::new(
            config.ppo.clone(),
            config.training.clone(),
            Some(sinks),
        ))
    }

    pub fn sinks(&self) -> Option<&TrainerSinks> {
        self.sinks.as_ref()
    }

    // ---------------------------------------------------------------------
    // Action service
    // ---------------------------------------------------------------------

    /// Serve an action for one agent, caching its log-prob and value
    pub fn request_action(&self, agent: &AgentKey, obs: &[f32]) -> Result<ActionDecision> {
        let role = route_role(obs);
        if obs.len() <= ROLE_FLAG_INDEX {
            debug!(len = obs.len(), "observation too short to carry the role flag");
            return Ok(ActionDecision::fallback(role));
        }
        let dims = Dims::new(obs.len());
        self.ensure_configured(dims);

        let (epoch, policy) = {
            let store = lock(&self.policies);
            if store.dims != Some(dims) {
                // Reconfigured concurrently for another shape
                return Ok(ActionDecision::fallback(role));
            }
            let policy = store.slots.get(role).as_ref().map(|s| s.infer.clone());
            (store.epoch, policy)
        };

        let Some(policy) = policy else {
            debug!("{}", TrainerError::PolicyUnavailable(role));
            return Ok(ActionDecision::fallback(role));
        };
        let sample = policy.sample(obs, &self.device)?;

        let mut shared = lock(&self.shared);
        if shared.epoch == epoch {
            shared.cache.insert(
                agent.clone(),
                CachedInference {
                    log_prob: sample.log_prob,
                    value: sample.value,
                    role,
                },
            );
        }

        Ok(ActionDecision {
            action: sample.action,
            log_prob: sample.log_prob,
            value: sample.value,
            role,
            source: ActionSource::Policy,
        })
    }

    /// Move to `dims`, discarding policies, buffers and cache on a change
    fn ensure_configured(&self, dims: Dims) {
        let mut shared = lock(&self.shared);
        if shared.dims == Some(dims) {
            return;
        }

        if let Some(old) = shared.dims {
            warn!(
                old_obs_dim = old.obs_dim,
                old_act_dim = old.act_dim,
                obs_dim = dims.obs_dim,
                act_dim = dims.act_dim,
                dropped = shared.buffers.total_len(),
                "observation/action space changed; reinitialising policies"
            );
        } else {
            info!(obs_dim = dims.obs_dim, act_dim = dims.act_dim, "configuring policies");
        }

        shared.epoch += 1;
        shared.dims = Some(dims);
        shared.buffers.clear();
        shared.cache.clear();
        shared.role_updates = PerRole::default();
        shared.last_round = RoundDiagnostics::default();

        let slots = self.build_policies(dims);
        let mut store = lock(&self.policies);
        store.epoch = shared.epoch;
        store.dims = Some(dims);
        store.slots = slots;
    }

    fn build_policies(&self, dims: Dims) -> PerRole<Option<PolicySlot>> {
        let build = |role: Role| {
            let loaded = match &self.sinks {
                Some(sinks) if !self.training.disable_policy_load => sinks
                    .checkpoints
                    .load_startup::<TrainingBackend>(role, dims, self.ppo.hidden_dim, &self.device),
                _ => None,
            };
            let train = loaded
                .unwrap_or_else(|| PolicyNet::new(&self.device, dims, self.ppo.hidden_dim));
            Some(PolicySlot::new(train))
        };
        PerRole::new(build(Role::Seeker), build(Role::Hider))
    }

    // ---------------------------------------------------------------------
    // Experience ingestion
    // ---------------------------------------------------------------------

    /// Store one transition; returns whether it closed the episode.
    ///
    /// Offline estimates are computed on a parameter copy outside the lock.
    /// Cache pop, buffer append and episode bookkeeping then happen under
    /// one hold of the shared lock.
    pub fn store_transition(&self, report: TransitionReport) -> Result<bool> {
        let role = route_role(&report.obs);
        let agent = AgentKey::from_optional(report.info.agent.as_deref());

        let (epoch, policy, cached) = {
            let shared = lock(&self.shared);
            if let Some(dims) = shared.dims {
                check_len(dims, &report.obs)?;
                if !report.done {
                    if let Some(next) = &report.next_obs {
                        check_len(dims, next)?;
                    }
                }
            }
            let policy = if shared.dims.is_some() {
                lock(&self.policies)
                    .slots
                    .get(role)
                    .as_ref()
                    .map(|s| s.infer.clone())
            } else {
                None
            };
            (shared.epoch, policy, shared.cache.contains(&agent))
        };

        // Forward passes run on the parameter copy with no lock held
        let offline = match (&policy, cached) {
            (Some(policy), false) => Some(policy.evaluate(&report.obs, report.action, &self.device)?),
            _ => None,
        };
        let next_value = match (&report.next_obs, &policy) {
            (Some(next), Some(policy)) if !report.done => policy.value(next, &self.device)?,
            _ => 0.0,
        };

        let mut shared = lock(&self.shared);
        if shared.epoch != epoch {
            // Reconfigured in between; the estimates came from discarded parameters
            return Err(TrainerError::ConfigMismatch {
                expected: shared.dims.map_or(0, |d| d.obs_dim),
                actual: report.obs.len(),
            });
        }

        let (log_prob, value) = match (shared.cache.pop(&agent), offline, &policy) {
            (Some(cached), _, _) => (cached.log_prob, cached.value),
            (None, Some(estimate), _) => estimate,
            // Entry consumed by a concurrent report for the same agent
            (None, None, Some(policy)) => policy.evaluate(&report.obs, report.action, &self.device)?,
            (None, None, None) => (0.0, 0.0),
        };

        shared.buffers.get_mut(role).push(Transition {
            obs: report.obs,
            action: report.action,
            reward: report.reward,
            done: report.done,
            log_prob,
            value,
            next_value,
        });
        shared.episode.record(role, report.reward, &report.info);

        Ok(report.done)
    }

    /// Ingest reports in order, closing the episode once if any was done
    pub fn ingest(&self, reports: Vec<TransitionReport>) -> IngestReport {
        let mut out = IngestReport::default();
        let mut closed = false;

        for report in reports {
            match self.store_transition(report) {
                Ok(done) => {
                    out.stored += 1;
                    closed |= done;
                }
                Err(e) => out.errors.push(e),
            }
        }

        if closed {
            match self.flush_episode() {
                Ok(row) => out.metrics = row,
                Err(e) => out.errors.push(e),
            }
        }
        out
    }

    // ---------------------------------------------------------------------
    // Episode aggregation
    // ---------------------------------------------------------------------

    /// Close the current episode and append its metrics row.
    ///
    /// Returns `Ok(None)` when the episode recorded nothing. A failed append
    /// is reported after the statistics have been reset.
    pub fn flush_episode(&self) -> Result<Option<MetricsRow>> {
        let row = {
            let mut shared = lock(&self.shared);
            shared.cache.clear();
            let evicted = shared.cache.evicted();
            if evicted > 0 {
                debug!(evicted, "action cache entries evicted so far");
            }
            let Some(summary) = shared.episode.flush() else {
                return Ok(None);
            };
            let updates = shared.role_updates.seeker + shared.role_updates.hider;
            metrics_row(&summary, updates, shared.last_round)
        };

        debug!(
            episode = row.episode,
            steps = row.steps,
            reward_sum = row.reward_sum,
            "episode closed"
        );

        if let Some(sinks) = &self.sinks {
            sinks.metrics.append(&row)?;
        }
        Ok(Some(row))
    }

    // ---------------------------------------------------------------------
    // Updates
    // ---------------------------------------------------------------------

    /// Update every role whose buffer reached `batch_target`.
    ///
    /// Only one round runs at a time; a concurrent call returns a `busy`
    /// summary. Rolled-back and failed batches are discarded.
    pub fn maybe_update(&self) -> UpdateSummary {
        let _gate = match self.update_gate.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                return UpdateSummary {
                    busy: true,
                    ..Default::default()
                }
            }
        };
        let mut summary = UpdateSummary::default();

        let (epoch, batches) = {
            let mut shared = lock(&self.shared);
            if shared.dims.is_none() {
                return summary;
            }
            let target = self.training.batch_target;
            let batches: Vec<(Role, Vec<Transition>)> = Role::ALL
                .iter()
                .filter_map(|&role| shared.buffers.take_if_ready(role, target).map(|b| (role, b)))
                .collect();
            (shared.epoch, batches)
        };
        if batches.is_empty() {
            return summary;
        }

        let mut results: Vec<(Role, UpdateStats, Option<PolicyNet<TrainingBackend>>)> = Vec::new();
        for (role, batch) in batches {
            let model = {
                let store = lock(&self.policies);
                if store.epoch != epoch {
                    summary.stale = true;
                    return summary;
                }
                store.slots.get(role).as_ref().map(|s| s.train.clone())
            };
            let Some(model) = model else {
                summary.errors.push(TrainerError::PolicyUnavailable(role));
                continue;
            };

            debug!(role = %role, batch = batch.len(), "running update");
            match self.learner.update(model, &batch, &self.device) {
                Ok(LearnerOutput { stats, model }) => results.push((role, stats, model)),
                Err(e) => summary.errors.push(e),
            }
        }

        let mut to_persist: Vec<(Role, u64, PolicyNet<InferenceBackend>)> = Vec::new();
        let global_updates = {
            let mut shared = lock(&self.shared);
            if shared.epoch != epoch {
                summary.stale = true;
                return summary;
            }
            let mut store = lock(&self.policies);

            for (role, stats, model) in results {
                if let Some(model) = model {
                    let slot = PolicySlot::new(model);
                    *shared.role_updates.get_mut(role) += 1;
                    to_persist.push((role, *shared.role_updates.get(role), slot.infer.clone()));
                    *store.slots.get_mut(role) = Some(slot);
                }
                summary.outcomes.push(RoleUpdate {
                    role,
                    stats,
                    role_updates: *shared.role_updates.get(role),
                    checkpoint: None,
                });
            }

            let accepted: Vec<&UpdateStats> = summary
                .outcomes
                .iter()
                .filter(|o| !o.stats.rolled_back())
                .map(|o| &o.stats)
                .collect();
            if !accepted.is_empty() {
                shared.global_updates += 1;
            }
            if let Some(diag) = RoundDiagnostics::weighted(&accepted) {
                shared.last_round = diag;
            }
            shared.global_updates
        };

        self.persist_round(&mut summary, to_persist, global_updates);
        summary
    }

    /// Checkpoints, legacy mirror and update log for a finished round
    fn persist_round(
        &self,
        summary: &mut UpdateSummary,
        models: Vec<(Role, u64, PolicyNet<InferenceBackend>)>,
        global_updates: u64,
    ) {
        let Some(sinks) = &self.sinks else {
            return;
        };

        for (role, step, model) in models {
            match sinks.checkpoints.save(role, step, &model) {
                Ok(path) => {
                    if let Some(outcome) = summary.outcomes.iter_mut().find(|o| o.role == role) {
                        outcome.checkpoint = Some(path);
                    }
                }
                Err(e) => summary.errors.push(e),
            }
            if role == Role::Seeker {
                if let Err(e) = sinks.checkpoints.save_legacy(&model) {
                    summary.errors.push(e);
                }
            }
        }

        for outcome in &summary.outcomes {
            let record = UpdateRecord {
                timestamp: Utc::now(),
                role: outcome.role,
                role_updates: outcome.role_updates,
                global_updates,
                stats: outcome.stats.clone(),
            };
            if let Err(e) = sinks.updates.append(&record) {
                summary.errors.push(e);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Active observation/action shape
    pub fn dims(&self) -> Option<Dims> {
        lock(&self.shared).dims
    }

    /// Configuration epoch, incremented on every (re)configuration
    pub fn epoch(&self) -> u64 {
        lock(&self.shared).epoch
    }

    pub fn buffer_len(&self, role: Role) -> usize {
        lock(&self.shared).buffers.get(role).len()
    }

    pub fn cached_actions(&self) -> usize {
        lock(&self.shared).cache.len()
    }

    pub fn role_updates(&self, role: Role) -> u64 {
        *lock(&self.shared).role_updates.get(role)
    }

    pub fn global_updates(&self) -> u64 {
        lock(&self.shared).global_updates
    }

    pub fn last_round(&self) -> RoundDiagnostics {
        lock(&self.shared).last_round
    }

    /// Shape of the parameters currently held for a role
    pub fn policy_dims(&self, role: Role) -> Option<Dims> {
        lock(&self.policies)
            .slots
            .get(role)
            .as_ref()
            .map(|s| s.infer.dims())
    }

    /// Log-probability and value of `action` under a role's current policy
    pub fn evaluate(&self, role: Role, obs: &[f32], action: BridgeAction) -> Result<(f32, f32)> {
        let policy = lock(&self.policies)
            .slots
            .get(role)
            .as_ref()
            .map(|s| s.infer.clone())
            .ok_or(TrainerError::PolicyUnavailable(role))?;
        policy.evaluate(obs, action, &self.device)
    }
}

fn check_len(dims: Dims, obs: &[f32]) -> Result<()> {
    if obs.len() == dims.obs_dim {
        Ok(())
    } else {
        Err(TrainerError::ConfigMismatch {
            expected: dims.obs_dim,
            actual: obs.len(),
        })
    }
}

fn metrics_row(summary: &EpisodeSummary, updates: u64, diag: RoundDiagnostics) -> MetricsRow {
    let seeker = &summary.roles.seeker;
    let hider = &summary.roles.hider;
    MetricsRow {
        episode: summary.index,
        episode_id: summary.episode_id,
        reward_mean: summary.reward_mean,
        reward_sum: summary.reward_sum,
        steps: summary.steps,
        updates,
        advantage_mean: diag.adv_mean,
        advantage_std: diag.adv_std,
        policy_loss: diag.policy_loss,
        value_loss: diag.value_loss,
        seeker_reward_sum: seeker.reward_sum,
        seeker_reward_mean: seeker.reward_mean,
        seeker_steps: seeker.steps,
        seeker_avg_distance: seeker.avg_distance,
        hider_reward_sum: hider.reward_sum,
        hider_reward_mean: hider.reward_mean,
        hider_steps: hider.steps,
        hider_avg_distance: hider.avg_distance,
        winner: summary.winner.clone(),
        terminal_reason: summary.terminal_reason.clone(),
        duration_sec: summary.duration_sec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::algorithms::InstabilityReason;
    use std::sync::Arc;

    fn trainer(batch_target: usize) -> Trainer {
        let ppo = PPOConfig {
            train_iters: 3,
            hidden_dim: 8,
            ..Default::default()
        };
        let training = TrainingConfig {
            batch_target,
            ..Default::default()
        };
        Trainer::new(ppo, training, None)
    }

    fn obs(len: usize, seeker: bool) -> Vec<f32> {
        let mut o = vec![0.1; len];
        o[ROLE_FLAG_INDEX] = if seeker { 1.0 } else { 0.0 };
        o
    }

    fn report(obs: Vec<f32>, reward: f32, done: bool) -> TransitionReport {
        TransitionReport {
            next_obs: Some(obs.clone()),
            obs,
            action: BridgeAction::new(0.1, 0.2, 0.0),
            reward,
            done,
            info: EpisodeInfo::default(),
        }
    }

    #[test]
    fn test_first_action_configures() {
        let t = trainer(16);
        assert!(t.dims().is_none());
        let decision = t.request_action(&AgentKey::single(), &obs(12, true)).unwrap();
        assert_eq!(decision.role, Role::Seeker);
        assert_eq!(decision.source, ActionSource::Policy);
        assert_eq!(t.dims(), Some(Dims::new(12)));
        assert_eq!(t.cached_actions(), 1);
        assert_eq!(t.policy_dims(Role::Hider), Some(Dims::new(12)));
    }

    #[test]
    fn test_empty_observation_gets_fallback() {
        let t = trainer(16);
        let decision = t.request_action(&AgentKey::single(), &[]).unwrap();
        assert_eq!(decision.source, ActionSource::Fallback);
        assert_eq!(decision.log_prob, 0.0);
        assert_eq!(decision.action.aux, 0.0);
        assert!(t.dims().is_none());
    }

    #[test]
    fn test_cached_inference_is_consumed() {
        let t = trainer(16);
        let o = obs(10, false);
        let decision = t.request_action(&AgentKey::single(), &o).unwrap();
        t.store_transition(TransitionReport {
            action: decision.action,
            ..report(o, 1.0, false)
        })
        .unwrap();
        assert_eq!(t.cached_actions(), 0);
        assert_eq!(t.buffer_len(Role::Hider), 1);
    }

    #[test]
    fn test_dimension_change_resets_everything() {
        let t = trainer(16);
        t.request_action(&AgentKey::single(), &obs(10, true)).unwrap();
        t.store_transition(report(obs(10, true), 1.0, false)).unwrap();
        let epoch = t.epoch();

        t.request_action(&AgentKey::new("a"), &obs(14, true)).unwrap();
        assert_eq!(t.epoch(), epoch + 1);
        assert_eq!(t.buffer_len(Role::Seeker), 0);
        assert_eq!(t.policy_dims(Role::Seeker), Some(Dims::new(14)));
        assert_eq!(t.policy_dims(Role::Hider), Some(Dims::new(14)));
    }

    #[test]
    fn test_mismatched_transition_rejected() {
        let t = trainer(16);
        t.request_action(&AgentKey::single(), &obs(10, true)).unwrap();
        let err = t.store_transition(report(obs(12, true), 1.0, false)).unwrap_err();
        assert!(matches!(err, TrainerError::ConfigMismatch { expected: 10, actual: 12 }));
        assert_eq!(t.buffer_len(Role::Seeker), 0);
    }

    #[test]
    fn test_unconfigured_transition_stored_with_zero_estimates() {
        let t = trainer(16);
        assert!(t.store_transition(report(obs(10, true), 2.0, true)).unwrap());
        assert_eq!(t.buffer_len(Role::Seeker), 1);
        let row = t.flush_episode().unwrap().unwrap();
        assert_eq!(row.steps, 1);
        assert_eq!(row.reward_sum, 2.0);
    }

    #[test]
    fn test_update_below_target_is_noop() {
        let t = trainer(4);
        t.request_action(&AgentKey::single(), &obs(10, true)).unwrap();
        t.store_transition(report(obs(10, true), 1.0, false)).unwrap();
        let summary = t.maybe_update();
        assert!(summary.is_empty());
        assert_eq!(t.buffer_len(Role::Seeker), 1);
    }

    #[test]
    fn test_short_observation_keeps_configuration() {
        let t = trainer(64);
        t.request_action(&AgentKey::single(), &obs(12, true)).unwrap();
        for _ in 0..5 {
            t.store_transition(report(obs(12, true), 1.0, false)).unwrap();
        }
        let epoch = t.epoch();

        let decision = t.request_action(&AgentKey::new("short"), &[0.5, 0.5]).unwrap();
        assert_eq!(decision.source, ActionSource::Fallback);
        let decision = t
            .request_action(&AgentKey::single(), &vec![1.0; ROLE_FLAG_INDEX])
            .unwrap();
        assert_eq!(decision.source, ActionSource::Fallback);

        assert_eq!(t.epoch(), epoch);
        assert_eq!(t.dims(), Some(Dims::new(12)));
        assert_eq!(t.buffer_len(Role::Seeker), 5);
        assert_eq!(t.policy_dims(Role::Hider), Some(Dims::new(12)));
    }

    #[test]
    fn test_kl_rollback_keeps_parameters() {
        let ppo = PPOConfig {
            train_iters: 10,
            hidden_dim: 8,
            lr: 0.05,
            target_kl: 1e-12,
            ..Default::default()
        };
        let training = TrainingConfig {
            batch_target: 4,
            ..Default::default()
        };
        let t = Trainer::new(ppo, training, None);

        let probe = obs(10, true);
        let action = BridgeAction::new(0.4, -0.4, 0.0);
        t.request_action(&AgentKey::single(), &probe).unwrap();
        let before = t.evaluate(Role::Seeker, &probe, action).unwrap();

        for reward in [1.0, -1.0, 2.0, -2.0] {
            t.store_transition(report(obs(10, true), reward, false)).unwrap();
        }
        let summary = t.maybe_update();

        assert_eq!(summary.outcomes.len(), 1);
        let stats = &summary.outcomes[0].stats;
        assert!(matches!(
            stats.rollback,
            Some(InstabilityReason::KlExceeded { .. })
        ));
        assert_eq!(stats.batch_size, 0);
        assert_eq!(t.evaluate(Role::Seeker, &probe, action).unwrap(), before);
        assert_eq!(t.role_updates(Role::Seeker), 0);
        assert_eq!(t.buffer_len(Role::Seeker), 0);
    }

    #[test]
    fn test_concurrent_ingestion_stores_every_transition() {
        let t = Arc::new(trainer(1000));
        t.request_action(&AgentKey::single(), &obs(10, true)).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || {
                    let agent = format!("agent_{}", i);
                    for _ in 0..5 {
                        let o = obs(10, i % 2 == 0);
                        t.request_action(&AgentKey::new(agent.clone()), &o).unwrap();
                        let mut r = report(o, 1.0, false);
                        r.info.agent = Some(agent.clone());
                        t.store_transition(r).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(t.buffer_len(Role::Seeker), 10);
        assert_eq!(t.buffer_len(Role::Hider), 10);
        // Only the setup request's entry is left
        assert_eq!(t.cached_actions(), 1);
    }

    #[test]
    fn test_weighted_diagnostics() {
        let a = UpdateStats {
            batch_size: 1,
            adv_mean: 1.0,
            ..Default::default()
        };
        let b = UpdateStats {
            batch_size: 3,
            adv_mean: 5.0,
            ..Default::default()
        };
        let diag = RoundDiagnostics::weighted(&[&a, &b]).unwrap();
        assert!((diag.adv_mean - 4.0).abs() < 1e-6);
        assert!(RoundDiagnostics::weighted(&[]).is_none());
    }
}
