use thiserror::Error;

/// Errors raised by event bus implementations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Failed to reach or stay connected to the broker.
    #[error("bus connection error: {0}")]
    Connection(String),

    /// Publishing or confirming a message failed.
    #[error("publish error: {0}")]
    Publish(String),

    /// The broker did not confirm the publish within the deadline.
    #[error("publish confirm timed out after {0:?}")]
    ConfirmTimeout(std::time::Duration),

    /// Declaring topology or starting a consumer failed.
    #[error("subscribe error: {0}")]
    Subscribe(String),

    /// Event body serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
