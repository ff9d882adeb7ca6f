use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ParseError;

/// A backend table whose row-level changes are published on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Orders,
    ShipmentRequests,
    FinancialDocuments,
    EventLogs,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Orders, Topic::ShipmentRequests, Topic::FinancialDocuments, Topic::EventLogs];

    /// The backend table name, as it appears in change-feed payloads
    pub fn table(&self) -> &'static str {
        match self {
            Topic::Orders => "orders",
            Topic::ShipmentRequests => "shipment_requests",
            Topic::FinancialDocuments => "financial_documents",
            Topic::EventLogs => "event_logs",
        }
    }
}

impl FromStr for Topic {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL.into_iter().find(|t| t.table() == s).ok_or_else(|| ParseError::UnknownTopic(s.to_string()))
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.table()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Insert,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

impl FromStr for EventKind {
    type Err = ParseError;

    /// Accepts both the feed's `INSERT`/`UPDATE`/`DELETE` and lowercase spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(EventKind::Insert),
            "update" => Ok(EventKind::Update),
            "delete" => Ok(EventKind::Delete),
            _ => Err(ParseError::UnknownEventKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.as_str()) }
}

/// Debounce key: one pending flush may exist per (topic, event kind)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopicKey {
    pub topic: Topic,
    pub kind: EventKind,
}

impl TopicKey {
    pub fn new(topic: Topic, kind: EventKind) -> Self { Self { topic, kind } }
}

impl FromStr for TopicKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (topic, kind) = s.split_once(':').ok_or_else(|| ParseError::MalformedTopicKey(s.to_string()))?;
        Ok(TopicKey { topic: topic.parse()?, kind: kind.parse()? })
    }
}

impl std::fmt::Display for TopicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}:{}", self.topic, self.kind) }
}
