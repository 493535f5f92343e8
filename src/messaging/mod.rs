//! Inbound/outbound message plumbing.

pub mod filters;
pub mod nats;
pub mod router;

use async_trait::async_trait;

pub use filters::{Route, ROUTES};
pub use router::{MessageRouter, Outcome};

pub const FUNCTION_UPDATED: &str = "function.updated";
pub const MESSAGE_ACCEPTED: &str = "message.accepted";

/// A message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub topic: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl IncomingMessage {
    pub fn new(
        topic: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A message to be sent to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub topic: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, msg: &OutgoingMessage) -> Result<(), PublishError>;
}
