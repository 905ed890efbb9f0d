use thiserror::Error;

/// Error event reported by the exchange over the WebSocket (`bts:error`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Protocol error on channel [{}]: {message}", .channel.as_deref().unwrap_or(""))]
pub struct ProtocolError {
    pub channel: Option<String>,
    pub code: Option<i64>,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("REST API error: status [{status}], response [{body}]")]
    RestError { status: u16, body: String },

    #[error("Response signature does not match: status [{status}], response [{body}]")]
    SignatureMismatch { status: u16, body: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Unknown currency pair: {base}/{quote}")]
    UnknownPair { base: String, quote: String },

    #[error("Channel already subscribed: {0}")]
    DuplicateChannel(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Failed to reconnect after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("WebSocket session is closed")]
    SessionClosed,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}
