//! WebSocket bridge server.
//!
//! Every connection runs its own message loop against the shared
//! [`Trainer`]. Trainer calls take std mutexes and run tensor math, so they
//! go through `spawn_blocking`. Update rounds are started after ingestion
//! and never awaited by the connection that triggered them.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::protocol::{self, Inbound, Outbound};
use crate::error::{Result, TrainerError};
use crate::rl::memory::AgentKey;
use crate::rl::training::{IngestReport, Trainer, TransitionReport, UpdateSummary};

/// Run a blocking trainer call off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TrainerError::Internal(format!("trainer task failed: {}", e)))
}

pub struct BridgeServer {
    listener: TcpListener,
    trainer: Arc<Trainer>,
}

impl BridgeServer {
    pub async fn bind(addr: &str, trainer: Arc<Trainer>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, trainer })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn trainer(&self) -> &Arc<Trainer> {
        &self.trainer
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!("bridge listening on ws://{}", addr);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let trainer = Arc::clone(&self.trainer);
                            tokio::spawn(async move {
                                match handle_connection(trainer, stream, peer).await {
                                    Ok(()) => info!(%peer, "client disconnected"),
                                    Err(e) => warn!(%peer, "connection closed with error: {}", e),
                                }
                            });
                        }
                        Err(e) => error!("accept failed: {}", e),
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown requested; bridge no longer accepting connections");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn handle_connection(trainer: Arc<Trainer>, stream: TcpStream, peer: SocketAddr) -> Result<()> {
    let ws = accept_async(stream).await?;
    info!(%peer, "client connected");
    let (mut writer, mut reader) = ws.split();

    while let Some(frame) = reader.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    debug!(%peer, "dropping non-utf8 binary frame");
                    continue;
                }
            },
            Message::Ping(data) => {
                writer.send(Message::Pong(data)).await?;
                continue;
            }
            Message::Close(_) => break,
            _ => continue,
        };

        let Some(inbound) = protocol::parse(&text) else {
            debug!(%peer, "dropping malformed frame");
            continue;
        };

        if let Some(reply) = dispatch(&trainer, inbound).await? {
            writer.send(Message::Text(reply.to_json()?)).await?;
        }
    }
    Ok(())
}

/// Handle one message; `Some` when it expects a reply
pub async fn dispatch(trainer: &Arc<Trainer>, inbound: Inbound) -> Result<Option<Outbound>> {
    match inbound {
        Inbound::Act { obs: None } => Ok(Some(Outbound::invalid_obs())),
        Inbound::Act { obs: Some(obs) } => {
            let t = Arc::clone(trainer);
            let decision = blocking(move || t.request_action(&AgentKey::single(), &obs)).await?;
            match decision {
                Ok(d) => Ok(Some(Outbound::action(d.action))),
                Err(e) => {
                    warn!("action request failed: {}", e);
                    Ok(Some(Outbound::invalid_obs()))
                }
            }
        }
        Inbound::ActBatch { obs } => {
            let t = Arc::clone(trainer);
            let actions = blocking(move || {
                let mut actions = BTreeMap::new();
                for (agent, o) in obs {
                    match t.request_action(&AgentKey::new(agent.clone()), &o) {
                        Ok(d) => {
                            actions.insert(agent, d.action);
                        }
                        Err(e) => warn!(agent = %agent, "action request failed: {}", e),
                    }
                }
                actions
            })
            .await?;
            Ok(Some(Outbound::action_batch(actions)))
        }
        Inbound::Transition(value) => {
            ingest(trainer, vec![value]).await?;
            Ok(None)
        }
        Inbound::TransitionBatch(values) => {
            ingest(trainer, values).await?;
            Ok(None)
        }
        Inbound::Other(value) => Ok(Some(Outbound::Echo { recv: value })),
    }
}

async fn ingest(trainer: &Arc<Trainer>, values: Vec<serde_json::Value>) -> Result<()> {
    let mut reports: Vec<TransitionReport> = Vec::with_capacity(values.len());
    for value in &values {
        match protocol::transition_report(value) {
            Ok(report) => reports.push(report),
            Err(e) => debug!("ignoring transition: {}", e),
        }
    }
    if reports.is_empty() {
        return Ok(());
    }

    let t = Arc::clone(trainer);
    let report = blocking(move || t.ingest(reports)).await?;
    log_ingest(&report);

    let t = Arc::clone(trainer);
    tokio::spawn(async move {
        match blocking(move || t.maybe_update()).await {
            Ok(summary) => log_update_summary(&summary),
            Err(e) => error!("update round failed: {}", e),
        }
    });
    Ok(())
}

fn log_ingest(report: &IngestReport) {
    for e in &report.errors {
        match e {
            TrainerError::ConfigMismatch { .. } | TrainerError::Protocol(_) => {
                debug!("transition rejected: {}", e)
            }
            _ => warn!("ingestion error: {}", e),
        }
    }
    if let Some(row) = &report.metrics {
        info!(
            episode = row.episode,
            episode_id = row.episode_id,
            steps = row.steps,
            reward_sum = row.reward_sum,
            winner = %row.winner,
            "episode finished"
        );
    }
}

/// Report an update round at the top of the call chain
pub fn log_update_summary(summary: &UpdateSummary) {
    if summary.busy {
        debug!("update round already running");
        return;
    }
    if summary.stale {
        info!("discarded update results for a replaced configuration");
    }
    for outcome in &summary.outcomes {
        let stats = &outcome.stats;
        match &stats.rollback {
            Some(reason) => warn!(
                "{}",
                TrainerError::UpdateInstability {
                    role: outcome.role,
                    reason: reason.to_string(),
                }
            ),
            None => info!(
                role = %outcome.role,
                updates = outcome.role_updates,
                batch = stats.batch_size,
                policy_loss = stats.policy_loss,
                value_loss = stats.value_loss,
                approx_kl = stats.approx_kl,
                iterations = stats.iterations,
                "policy updated"
            ),
        }
    }
    for e in &summary.errors {
        error!("update error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::config::{PPOConfig, TrainingConfig};
    use crate::rl::core::{Role, ROLE_FLAG_INDEX};
    use serde_json::json;
    use tokio_test::assert_ok;

    fn trainer() -> Arc<Trainer> {
        Arc::new(Trainer::new(PPOConfig::default(), TrainingConfig::default(), None))
    }

    #[tokio::test]
    async fn test_dispatch_replies() {
        let t = trainer();

        let reply = assert_ok!(dispatch(&t, Inbound::Act { obs: None }).await);
        assert_eq!(reply, Some(Outbound::invalid_obs()));

        let reply = assert_ok!(dispatch(&t, Inbound::Act { obs: Some(vec![0.0; 10]) }).await);
        assert!(matches!(reply, Some(Outbound::Action { .. })));

        let reply = assert_ok!(dispatch(&t, Inbound::Other(json!({"type": "ping"}))).await);
        assert_eq!(reply, Some(Outbound::Echo { recv: json!({"type": "ping"}) }));
    }

    #[tokio::test]
    async fn test_short_act_keeps_configuration() {
        let t = trainer();
        assert_ok!(dispatch(&t, Inbound::Act { obs: Some(vec![0.0; 10]) }).await);
        let epoch = t.epoch();

        let reply = assert_ok!(dispatch(&t, Inbound::Act { obs: Some(vec![0.5, 0.5]) }).await);
        assert!(matches!(reply, Some(Outbound::Action { .. })));
        assert_eq!(t.epoch(), epoch);
        assert_eq!(t.dims().map(|d| d.obs_dim), Some(10));
    }

    #[tokio::test]
    async fn test_act_batch_reply_keys() {
        let t = trainer();
        let obs = vec![
            ("seeker_0".to_string(), {
                let mut o = vec![0.0; 10];
                o[ROLE_FLAG_INDEX] = 1.0;
                o
            }),
            ("hider_0".to_string(), vec![0.0; 10]),
        ];
        let Some(Outbound::ActionBatch { actions, .. }) =
            assert_ok!(dispatch(&t, Inbound::ActBatch { obs }).await)
        else {
            panic!("expected action_batch");
        };
        assert_eq!(actions.len(), 2);
        assert!(actions.contains_key("seeker_0"));
        assert!(actions.contains_key("hider_0"));
        assert_eq!(t.cached_actions(), 2);
    }

    #[tokio::test]
    async fn test_transition_has_no_reply() {
        let t = trainer();
        let msg = json!({"obs": vec![0.0; 10], "action": [0.1, 0.2], "reward": 1.0});
        let reply = assert_ok!(dispatch(&t, Inbound::Transition(msg)).await);
        assert!(reply.is_none());
        assert_eq!(t.buffer_len(Role::Hider), 1);

        let bad = json!({"obs": "x"});
        let reply = assert_ok!(dispatch(&t, Inbound::TransitionBatch(vec![bad])).await);
        assert!(reply.is_none());
        assert_eq!(t.buffer_len(Role::Hider), 1);
    }
}
