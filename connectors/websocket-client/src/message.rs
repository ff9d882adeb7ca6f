//! Phoenix channel framing (JSON serializer, protocol version 1.0.0) as spoken by the hosted
//! change-feed service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use wms_realtime_proto::{ChangeEvent, EventKind, ParseError, Topic};

pub const PHOENIX_TOPIC: &str = "phoenix";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized change: {0}")]
    Proto(#[from] ParseError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    /// Join `topic`, asking for row changes on each table in `tables`
    pub fn join(topic: &str, join_ref: &str, schema: &str, tables: &[Topic], access_token: &str) -> Self {
        let bindings: Vec<Value> = tables.iter().map(|t| json!({"event": "*", "schema": schema, "table": t.table()})).collect();
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": {"self": false, "ack": false},
                    "presence": {"key": ""},
                    "postgres_changes": bindings,
                },
                "access_token": access_token,
            }),
            msg_ref: Some(join_ref.to_string()),
            join_ref: Some(join_ref.to_string()),
        }
    }

    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    pub fn leave(topic: &str, msg_ref: &str) -> Self {
        Self { topic: topic.to_string(), event: "phx_leave".to_string(), payload: json!({}), msg_ref: Some(msg_ref.to_string()), join_ref: None }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> { serde_json::to_string(self) }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> { serde_json::from_str(text) }
}

/// What an inbound frame means for the channel we joined
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Joined,
    JoinRejected(String),
    HeartbeatAck(String),
    Change(ChangeEvent),
    ChannelError(String),
    ChannelClosed,
    Ignored,
}

#[derive(Debug, Deserialize)]
struct PostgresChange {
    table: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
    #[serde(default)]
    commit_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ChangesPayload {
    data: PostgresChange,
}

fn non_empty(row: Option<Value>) -> Option<Value> { row.filter(|row| !matches!(row, Value::Object(map) if map.is_empty()) && !row.is_null()) }

impl Inbound {
    pub fn classify(message: PhoenixMessage, channel_topic: &str, join_ref: &str) -> Result<Self, DecodeError> {
        if message.topic == PHOENIX_TOPIC {
            return Ok(match (message.event.as_str(), message.msg_ref) {
                ("phx_reply", Some(msg_ref)) => Inbound::HeartbeatAck(msg_ref),
                _ => Inbound::Ignored,
            });
        }
        if message.topic != channel_topic {
            return Ok(Inbound::Ignored);
        }

        match message.event.as_str() {
            "phx_reply" if message.msg_ref.as_deref() == Some(join_ref) => {
                let status = message.payload.get("status").and_then(Value::as_str).unwrap_or_default();
                if status == "ok" {
                    Ok(Inbound::Joined)
                } else {
                    let reason = message.payload.pointer("/response/reason").and_then(Value::as_str).unwrap_or(status);
                    Ok(Inbound::JoinRejected(reason.to_string()))
                }
            }
            "phx_error" => Ok(Inbound::ChannelError("channel crashed on server".to_string())),
            "phx_close" => Ok(Inbound::ChannelClosed),
            "system" if message.payload.get("status").and_then(Value::as_str) == Some("error") => {
                let reason = message.payload.get("message").and_then(Value::as_str).unwrap_or("system error");
                Ok(Inbound::ChannelError(reason.to_string()))
            }
            "postgres_changes" => {
                let ChangesPayload { data } = serde_json::from_value(message.payload)?;
                let mut event = ChangeEvent::new(data.table.parse::<Topic>()?, data.kind.parse::<EventKind>()?);
                event.before = non_empty(data.old_record);
                event.after = non_empty(data.record);
                event.commit_timestamp = data.commit_timestamp;
                Ok(Inbound::Change(event))
            }
            _ => Ok(Inbound::Ignored),
        }
    }
}
