//! Error types for fleetsync

/// Main error type for fleet engine operations
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("Bad event payload: {0}")]
    BadPayload(String),

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Panel API error: {0}")]
    Panel(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Implement From conversions for common error types

impl From<std::io::Error> for FleetError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadPayload(format!("JSON error: {}", err))
    }
}

impl From<async_nats::Error> for FleetError {
    fn from(err: async_nats::Error) -> Self {
        Self::Nats(err.to_string())
    }
}

impl From<mongodb::error::Error> for FleetError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Directory(err.to_string())
    }
}

impl From<reqwest::Error> for FleetError {
    fn from(err: reqwest::Error) -> Self {
        Self::Panel(err.to_string())
    }
}

/// Result type alias for fleet engine operations
pub type Result<T> = std::result::Result<T, FleetError>;
