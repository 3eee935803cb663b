//! Transport settings types.
//!
//! Every struct uses `#[serde(default)]` so a partial JSON file only needs
//! to name the keys it overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default plain-HTTP listening port.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default TLS listening port.
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default outbound handshake timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default keepalive probe interval in milliseconds.
pub const DEFAULT_KEEPALIVE_MS: u64 = 15_000;

/// How application messages are laid out in WebSocket frames.
///
/// Not negotiated: both peers must be configured with the same mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameMode {
    /// Gzip-compressed, base64-encoded text frames.
    #[default]
    Text,
    /// Raw serialized bytes in binary frames.
    Binary,
}

/// Where marshalling timing traces go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceTiming {
    /// No timing output.
    #[default]
    Off,
    /// Emit through `tracing` at info level.
    Log,
    /// Print to stdout.
    Console,
}

impl TraceTiming {
    /// Parse the trace toggle.
    ///
    /// `true`/`log`/`logservice` select the log sink, `console`/`systemout`
    /// select stdout, `false`/`off` disable tracing. Case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "true" | "log" | "logservice" => Some(Self::Log),
            "console" | "systemout" => Some(Self::Console),
            "false" | "off" | "" => Some(Self::Off),
            _ => None,
        }
    }

    /// Whether any sink is active.
    pub fn is_enabled(self) -> bool {
        self != Self::Off
    }
}

/// Certificate material for the TLS listener.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsSettings {
    /// PEM file holding the server certificate chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,
    /// PEM file holding the server private key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
}

/// Top-level settings for the WebSocket transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Whether factories accept inbound connections.
    pub listen: bool,
    /// Whether the plain `http` transport is offered.
    pub register_http: bool,
    /// Whether the TLS `https` transport is offered.
    pub register_https: bool,
    /// Bind address for listeners.
    pub host: String,
    /// Listening port of the `http` transport.
    pub http_port: u16,
    /// Listening port of the `https` transport.
    pub https_port: u16,
    /// Outbound handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Keepalive probe interval in milliseconds (`0` disables probing).
    pub keepalive_ms: u64,
    /// Whether inbound channels run the keepalive monitor as well.
    pub keepalive_inbound: bool,
    /// Frame encoding used for outgoing messages.
    pub frame_mode: FrameMode,
    /// Timing trace sink.
    pub trace_timing: TraceTiming,
    /// TLS listener material.
    pub tls: TlsSettings,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            listen: true,
            register_http: true,
            register_https: true,
            host: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            https_port: DEFAULT_HTTPS_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            keepalive_ms: DEFAULT_KEEPALIVE_MS,
            keepalive_inbound: false,
            frame_mode: FrameMode::Text,
            trace_timing: TraceTiming::Off,
            tls: TlsSettings::default(),
        }
    }
}

impl TransportSettings {
    /// Outbound handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Keepalive probe interval, `None` when probing is disabled.
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_ms > 0).then(|| Duration::from_millis(self.keepalive_ms))
    }
}
