//! Error types for the authorization client
//!
//! Cancellation has no variant: superseded work is dropped before it can
//! produce an error, so every variant here is a real failure.

use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the authorization REST endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, TLS or timeout failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Any non-success status other than the expected denial
    #[error("unexpected status {status}")]
    Status {
        /// Status the service answered with
        status: StatusCode,
    },

    /// Body could not be decoded into the expected shape
    #[error("invalid response body: {0}")]
    Decode(String),

    /// Endpoint URL could not be built from the configured base
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// Status code carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status } => Some(*status),
            ApiError::Transport(err) => err.status(),
            _ => None,
        }
    }
}

/// Failures opening or reading the push channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Websocket handshake or framing failure
    #[error("websocket error: {0}")]
    Transport(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// Push endpoint could not be derived from the configured base
    #[error("invalid push endpoint: {0}")]
    Endpoint(String),

    /// Connector-specific failure (used by alternative transports)
    #[error("channel failure: {0}")]
    Other(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::Transport(Box::new(err))
    }
}

/// Result type alias for REST operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Failures wiring the production provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// REST client could not be built
    #[error("failed to build authorization client: {0}")]
    Api(#[from] ApiError),

    /// Push endpoint could not be derived from the base URL
    #[error("failed to derive push channel endpoint: {0}")]
    Channel(#[from] ChannelError),
}
