// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Event channel closed: {0}")]
    ChannelClosed(String),
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Alert delivery failed: {0}")]
    Delivery(String),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Bar store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bar record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type ExchangeResult<T> = Result<T, ExchangeError>;
pub type NotificationResult<T> = Result<T, NotificationError>;
pub type PersistenceResult<T> = Result<T, PersistenceError>;
