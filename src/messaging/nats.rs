//! NATS transport for the router and publisher.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use super::{IncomingMessage, MessageRouter, OutgoingMessage, PublishError, Publisher};

const CONTENT_TYPE: &str = "Content-Type";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Connect to the broker at `url`.
///
/// # Errors
///
/// Returns `TransportError::Connect` if the connection cannot be established.
pub async fn connect(url: &str) -> Result<async_nats::Client, TransportError> {
    async_nats::connect(url)
        .await
        .map_err(|e| TransportError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, msg: &OutgoingMessage) -> Result<(), PublishError> {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(CONTENT_TYPE, msg.content_type.as_str());

        self.client
            .publish_with_headers(msg.topic.clone(), headers, msg.body.clone().into())
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        tracing::debug!(topic = %msg.topic, content_type = %msg.content_type, "Message published");
        Ok(())
    }
}

/// Subscribe to every routed topic and dispatch messages until the
/// subscriptions end. Each message is handled on its own task.
///
/// # Errors
///
/// Returns `TransportError::Subscribe` if a subscription cannot be created.
pub async fn run_consumer(
    client: async_nats::Client,
    router: Arc<MessageRouter>,
) -> Result<(), TransportError> {
    let mut consumers = Vec::new();

    for topic in router.topics() {
        let mut subscriber =
            client
                .subscribe(topic)
                .await
                .map_err(|e| TransportError::Subscribe {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;

        tracing::info!(topic, "Subscribed");

        let router = router.clone();
        consumers.push(tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let content_type = message
                    .headers
                    .as_ref()
                    .and_then(|h| h.get(CONTENT_TYPE))
                    .map(|v| v.as_str().to_string())
                    .unwrap_or_default();

                let incoming = IncomingMessage::new(
                    message.subject.as_str(),
                    content_type,
                    message.payload.to_vec(),
                );

                let router = router.clone();
                tokio::spawn(async move {
                    router.dispatch(&incoming).await;
                });
            }

            tracing::warn!(topic, "Subscription closed");
        }));
    }

    futures::future::join_all(consumers).await;
    Ok(())
}
