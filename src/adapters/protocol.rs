//! Bridge wire protocol.
//!
//! One JSON object per WebSocket text frame, discriminated by `type`:
//!
//! | `type`             | reply                                   |
//! |--------------------|-----------------------------------------|
//! | `act`              | `action`                                |
//! | `act_batch`        | `action_batch`                          |
//! | `transition`       | none                                    |
//! | `transition_batch` | none                                    |
//! | anything else      | `echo` carrying the original message    |
//!
//! Frames that are not valid JSON are dropped without a reply.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{Result, TrainerError};
use crate::rl::core::{BridgeAction, ACTION_DIM};
use crate::rl::training::{EpisodeInfo, TransitionReport};

/// `info.error` value sent back for an `act` without a usable observation
pub const INVALID_OBS: &str = "invalid_obs";

/// Parsed inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Single-agent action request; `None` when `obs` is not a number list
    Act { obs: Option<Vec<f32>> },
    /// Per-agent action requests; entries that are not number lists are skipped
    ActBatch { obs: Vec<(String, Vec<f32>)> },
    Transition(Value),
    TransitionBatch(Vec<Value>),
    /// Unknown or missing `type`
    Other(Value),
}

/// Outbound reply
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Action {
        action: [f32; ACTION_DIM],
        info: Value,
    },
    ActionBatch {
        actions: BTreeMap<String, [f32; ACTION_DIM]>,
        info: Value,
    },
    Echo {
        recv: Value,
    },
}

impl Outbound {
    pub fn action(action: BridgeAction) -> Self {
        Outbound::Action {
            action: action.to_array(),
            info: Value::Object(Map::new()),
        }
    }

    pub fn invalid_obs() -> Self {
        Outbound::Action {
            action: BridgeAction::zero().to_array(),
            info: json!({ "error": INVALID_OBS }),
        }
    }

    pub fn action_batch(actions: BTreeMap<String, BridgeAction>) -> Self {
        Outbound::ActionBatch {
            actions: actions
                .into_iter()
                .map(|(agent, a)| (agent, a.to_array()))
                .collect(),
            info: Value::Object(Map::new()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse a frame; `None` for malformed JSON
pub fn parse(text: &str) -> Option<Inbound> {
    let value: Value = serde_json::from_str(text).ok()?;
    Some(classify(value))
}

fn classify(value: Value) -> Inbound {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "act" => Inbound::Act {
            obs: value.get("obs").and_then(float_list),
        },
        "act_batch" => {
            let obs = match value.get("obs") {
                Some(Value::Object(map)) => map
                    .iter()
                    .filter_map(|(agent, v)| float_list(v).map(|o| (agent.clone(), o)))
                    .collect(),
                _ => Vec::new(),
            };
            Inbound::ActBatch { obs }
        }
        "transition" => Inbound::Transition(value),
        "transition_batch" => match value.get("transitions") {
            Some(Value::Array(items)) => Inbound::TransitionBatch(items.clone()),
            _ => Inbound::TransitionBatch(Vec::new()),
        },
        _ => Inbound::Other(value),
    }
}

/// A JSON array of numbers as `f32`
pub fn float_list(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Build a transition report from a `transition` message or batch entry.
///
/// `obs` and `action` are required number lists; `reward` defaults to 0,
/// `done` to false, and `next_obs`/`info` are optional.
pub fn transition_report(value: &Value) -> Result<TransitionReport> {
    let obs = value
        .get("obs")
        .and_then(float_list)
        .ok_or_else(|| TrainerError::Protocol("transition without numeric obs list".into()))?;
    let action = value
        .get("action")
        .and_then(float_list)
        .ok_or_else(|| TrainerError::Protocol("transition without numeric action list".into()))?;
    let action = BridgeAction::from_reported(&action)?;

    let reward = match value.get("reward") {
        None | Some(Value::Null) => 0.0,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| TrainerError::Protocol(format!("non-numeric reward: {}", v)))?
            as f32,
    };
    let done = match value.get("done") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        _ => false,
    };

    Ok(TransitionReport {
        obs,
        action,
        reward,
        done,
        next_obs: value.get("next_obs").and_then(float_list),
        info: EpisodeInfo::from_json(value.get("info")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_json_is_dropped() {
        assert!(parse("{not json").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn test_act_parsing() {
        assert_eq!(
            parse(r#"{"type":"act","obs":[1,2.5]}"#),
            Some(Inbound::Act {
                obs: Some(vec![1.0, 2.5])
            })
        );
        assert_eq!(
            parse(r#"{"type":"act","obs":"nope"}"#),
            Some(Inbound::Act { obs: None })
        );
        assert_eq!(
            parse(r#"{"type":"act","obs":[1,"x"]}"#),
            Some(Inbound::Act { obs: None })
        );
    }

    #[test]
    fn test_act_batch_skips_non_lists() {
        let parsed = parse(r#"{"type":"act_batch","obs":{"a":[0.5],"b":7,"c":[1,2]}}"#);
        let Some(Inbound::ActBatch { obs }) = parsed else {
            panic!("expected act_batch");
        };
        let agents: Vec<&str> = obs.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(agents, vec!["a", "c"]);
    }

    #[test]
    fn test_unknown_type_is_other() {
        let parsed = parse(r#"{"type":"hello","n":1}"#).unwrap();
        assert_eq!(parsed, Inbound::Other(json!({"type":"hello","n":1})));
        assert!(matches!(parse("[1,2]"), Some(Inbound::Other(_))));
    }

    #[test]
    fn test_transition_report_defaults() {
        let report = transition_report(&json!({
            "obs": [0.1, 0.2], "action": [0.5, -0.5]
        }))
        .unwrap();
        assert_eq!(report.reward, 0.0);
        assert!(!report.done);
        assert!(report.next_obs.is_none());
        assert_eq!(report.action.aux, 0.0);
    }

    #[test]
    fn test_transition_report_full() {
        let report = transition_report(&json!({
            "obs": [0.1], "action": [0.1, 0.2, 0.3], "reward": -1.5, "done": true,
            "next_obs": [0.2], "info": {"agent": "hider_1", "winner": "hider"}
        }))
        .unwrap();
        assert_eq!(report.reward, -1.5);
        assert!(report.done);
        assert_eq!(report.next_obs, Some(vec![0.2]));
        assert_eq!(report.info.agent.as_deref(), Some("hider_1"));
        assert_eq!(report.info.winner.as_deref(), Some("hider"));
    }

    #[test]
    fn test_transition_report_errors() {
        assert!(matches!(
            transition_report(&json!({"obs": 1, "action": [0, 0]})),
            Err(TrainerError::Protocol(_))
        ));
        assert!(matches!(
            transition_report(&json!({"obs": [1], "action": [0]})),
            Err(TrainerError::Protocol(_))
        ));
        assert!(matches!(
            transition_report(&json!({"obs": [1], "action": [0, 0], "reward": "big"})),
            Err(TrainerError::Protocol(_))
        ));
    }

    #[test]
    fn test_outbound_shapes() {
        let v: Value = serde_json::from_str(&Outbound::invalid_obs().to_json().unwrap()).unwrap();
        assert_eq!(v, json!({"type":"action","action":[0.0,0.0,0.0],"info":{"error":"invalid_obs"}}));

        let mut actions = BTreeMap::new();
        actions.insert("a".to_string(), BridgeAction::new(0.5, -0.5, 0.0));
        let v: Value =
            serde_json::from_str(&Outbound::action_batch(actions).to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "action_batch");
        assert_eq!(v["actions"]["a"], json!([0.5, -0.5, 0.0]));

        let v: Value = serde_json::from_str(
            &Outbound::Echo { recv: json!({"type":"ping"}) }.to_json().unwrap(),
        )
        .unwrap();
        assert_eq!(v, json!({"type":"echo","recv":{"type":"ping"}}));
    }
}
