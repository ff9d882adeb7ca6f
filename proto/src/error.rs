use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),
    #[error("malformed topic key: {0}")]
    MalformedTopicKey(String),
}
