//! Transport error types.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Boxed cause carried by connect failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why an inbound frame could not be turned into a message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Text frame was not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Payload carried the gzip magic but did not inflate.
    #[error("invalid gzip payload: {0}")]
    Gzip(#[source] std::io::Error),
    /// Gzip payload inflated past the message size limit.
    #[error("inflated payload exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },
    /// Serialized message shorter than its fixed header.
    #[error("message truncated: {len} bytes, header needs {needed}")]
    Truncated {
        /// Bytes available.
        len: usize,
        /// Bytes required by the header.
        needed: usize,
    },
    /// Frame kind that never carries application messages.
    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),
}

/// Errors surfaced by channels and channel factories.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Outbound handshake, DNS or TLS setup failed. No channel was created.
    #[error("could not connect to {target}: {source}")]
    Connect {
        /// Target URI as given by the caller.
        target: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
    /// Listener or TLS context could not be configured.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Writing a frame failed. The channel state is left unchanged.
    #[error("send failed: {0}")]
    Send(#[source] tungstenite::Error),
    /// Inbound frame could not be decoded.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    /// Peer did not answer a keepalive probe in time.
    #[error("pong not received in {}ms", waited.as_millis())]
    Liveness {
        /// How long the monitor waited for the pong.
        waited: Duration,
    },
    /// Target URI could not be mapped to a WebSocket URI.
    #[error("invalid URI {uri}: {reason}")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// What was wrong with it.
        reason: String,
    },
    /// Socket-level failure outside of a channel (e.g. bind).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Wrap any error as a connect failure for `target`.
    pub fn connect(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connect {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Short machine-friendly category, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Configuration(_) => "configuration",
            Self::Send(_) => "send",
            Self::Decode(_) => "decode",
            Self::Liveness { .. } => "liveness",
            Self::InvalidUri { .. } => "invalid_uri",
            Self::Io(_) => "io",
        }
    }
}
