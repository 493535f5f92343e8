use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::Instrument;
use uuid::Uuid;

use super::filters::{self, matching_kinds};
use super::{IncomingMessage, FUNCTION_UPDATED, MESSAGE_ACCEPTED};
use crate::error::{AppError, AppResult};
use crate::functions::EntityKind;
use crate::reconciler::Reconciler;
use crate::senml::Pack;

/// Result of reconciling one message against one entity kind.
#[derive(Debug)]
pub struct Outcome {
    pub kind: EntityKind,
    pub result: AppResult<bool>,
}

#[derive(Debug, Deserialize)]
struct FunctionSubject {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct PackSubject {
    #[serde(default)]
    pack: Pack,
}

/// Subject identifier of an inbound message.
///
/// `function.updated` bodies carry it as `id`; `message.accepted` bodies carry
/// a sensor pack whose device record names it.
///
/// # Errors
///
/// - `AppError::Decode` if the body is not valid JSON
/// - `AppError::MissingSubject` if no identifier can be found
pub fn subject_id(msg: &IncomingMessage) -> AppResult<String> {
    let id = match msg.topic.as_str() {
        FUNCTION_UPDATED => Some(serde_json::from_slice::<FunctionSubject>(&msg.body)?.id),
        MESSAGE_ACCEPTED => serde_json::from_slice::<PackSubject>(&msg.body)?
            .pack
            .device_id(),
        _ => None,
    };

    id.filter(|id| !id.is_empty())
        .ok_or(AppError::MissingSubject)
}

pub struct MessageRouter {
    reconciler: Arc<Reconciler>,
    processing_timeout: Duration,
}

impl MessageRouter {
    pub fn new(reconciler: Arc<Reconciler>, processing_timeout: Duration) -> Self {
        Self {
            reconciler,
            processing_timeout,
        }
    }

    /// Topics the router has routes for.
    #[must_use]
    pub fn topics(&self) -> Vec<&'static str> {
        filters::topics()
    }

    /// Fan a message out to every entity kind whose route matches it.
    ///
    /// Each kind is reconciled independently under its own deadline. Messages
    /// without a matching route, or whose subject cannot be read, yield no
    /// outcomes.
    pub async fn dispatch(&self, msg: &IncomingMessage) -> Vec<Outcome> {
        let kinds = matching_kinds(&msg.topic, &msg.content_type);

        if kinds.is_empty() {
            tracing::debug!(
                topic = %msg.topic,
                content_type = %msg.content_type,
                "No route for message"
            );
            return Vec::new();
        }

        let subject_id = match subject_id(msg) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    topic = %msg.topic,
                    content_type = %msg.content_type,
                    error = %e,
                    body = %msg.body_lossy(),
                    "Dropping malformed message"
                );
                return Vec::new();
            }
        };

        let span = tracing::info_span!(
            "message",
            message_id = %Uuid::new_v4(),
            topic = %msg.topic,
            content_type = %msg.content_type,
            subject_id = %subject_id,
        );

        let work = kinds
            .into_iter()
            .map(|kind| self.reconcile(kind, &subject_id, msg));

        futures::future::join_all(work).instrument(span).await
    }

    async fn reconcile(&self, kind: EntityKind, subject_id: &str, msg: &IncomingMessage) -> Outcome {
        let span = tracing::debug_span!("reconcile", entity_type = %kind);
        let work = self.reconciler.process(kind, subject_id, msg);

        let result = match tokio::time::timeout(self.processing_timeout, work)
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.processing_timeout)),
        };

        match &result {
            Ok(changed) => {
                tracing::debug!(entity_type = %kind, changed, "Reconciled");
            }
            Err(e) => {
                tracing::error!(entity_type = %kind, error = %e, "Reconciliation failed");
            }
        }

        Outcome { kind, result }
    }
}
