//! Error types shared across the workspace.

use thiserror::Error;

/// Every failure a DriverBot library crate can report.
#[derive(Debug, Error)]
pub enum DriverBotError {
    /// The external state store could not be read or written.
    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    /// A single chat transport send failed.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Chat transport failure outside of a send (polling, getMe).
    #[error("channel error: {0}")]
    Channel(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DriverBotError {
    /// True for errors that mean the store could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, DriverBotError::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, DriverBotError>;
