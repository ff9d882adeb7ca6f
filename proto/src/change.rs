use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::topic::{EventKind, Topic, TopicKey};

/// A row-level change notification delivered by the change feed.
///
/// `before` / `after` carry the row images when the feed provides them. Nothing downstream
/// routes on the payload; only the topic and kind matter for invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub topic: Topic,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    pub fn new(topic: Topic, kind: EventKind) -> Self { Self { topic, kind, before: None, after: None, commit_timestamp: None } }

    pub fn with_after(mut self, row: serde_json::Value) -> Self {
        self.after = Some(row);
        self
    }

    pub fn with_before(mut self, row: serde_json::Value) -> Self {
        self.before = Some(row);
        self
    }

    pub fn key(&self) -> TopicKey { TopicKey::new(self.topic, self.kind) }

    /// Short description for logs, e.g. `orders:update id=42`
    pub fn summary(&self) -> String {
        let id = self.after.as_ref().or(self.before.as_ref()).and_then(|row| row.get("id"));
        match id {
            Some(serde_json::Value::String(id)) => format!("{} id={}", self.key(), id),
            Some(id) => format!("{} id={}", self.key(), id),
            None => self.key().to_string(),
        }
    }
}

/// Subscription progress reported by the transport for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ChannelStatus {
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

impl ChannelStatus {
    pub fn is_failure(&self) -> bool { !matches!(self, ChannelStatus::Subscribed) }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelStatus::Subscribed => write!(f, "subscribed"),
            ChannelStatus::ChannelError(reason) => write!(f, "channel_error: {}", reason),
            ChannelStatus::TimedOut => write!(f, "timed_out"),
            ChannelStatus::Closed => write!(f, "closed"),
        }
    }
}
