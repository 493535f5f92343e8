use crate::functions::HandleError;
use crate::messaging::PublishError;
use crate::storage::StoreError;
use crate::things::ThingsError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Things registry error: {0}")]
    Things(#[from] ThingsError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Could not handle message: {0}")]
    Handle(#[from] HandleError),

    #[error("Could not publish message: {0}")]
    Publish(#[from] PublishError),

    #[error("Malformed message body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Message contains no subject identifier")]
    MissingSubject,

    #[error("Reconciliation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type AppResult<T> = Result<T, AppError>;
