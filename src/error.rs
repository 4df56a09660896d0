//! Error types for the stream core

use thiserror::Error;

/// Stream core errors
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("WebSocket connection error: {0}")]
    Connection(String),

    #[error("WebSocket message error: {0}")]
    Message(String),

    #[error("Failed to parse message: {0}")]
    Parse(String),

    #[error("REST API error: {0}")]
    Http(String),

    #[error("Instrument resolution error: {0}")]
    Resolve(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("IPC error: {0}")]
    Publish(String),

    #[error("No traffic received within the staleness threshold")]
    ConnectionStale,
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketDataError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MarketDataError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        MarketDataError::Http(err.to_string())
    }
}

impl From<std::io::Error> for MarketDataError {
    fn from(err: std::io::Error) -> Self {
        MarketDataError::Publish(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;
