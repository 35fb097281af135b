//! Application-wide error types.

use escrow_lifecycle::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Collaborator failures reach the lifecycle as [`StoreError`].
impl From<ServiceError> for StoreError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Json(_) | ServiceError::Decode(_) => StoreError::Decode(err.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
