//! Per-factory configuration derived from [`TransportSettings`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::rustls::ClientConfig;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use wirelink_settings::{FrameMode, TlsSettings, TraceTiming, TransportSettings};

/// Transport protocol a factory serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain WebSocket (`ws://`).
    Http,
    /// WebSocket over TLS (`wss://`).
    Https,
}

impl Protocol {
    /// Protocol name as used in channel addresses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Whether the protocol runs over TLS.
    pub fn is_secure(self) -> bool {
        self == Self::Https
    }

    /// Parse a URI scheme. Accepts the WebSocket schemes as aliases.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "http" | "ws" => Some(Self::Http),
            "https" | "wss" => Some(Self::Https),
            _ => None,
        }
    }

    /// The WebSocket scheme this protocol maps to.
    pub fn ws_scheme(self) -> &'static str {
        match self {
            Self::Http => "ws",
            Self::Https => "wss",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings every channel of a factory shares.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Keepalive probe interval; `None` disables the monitor.
    pub keepalive_interval: Option<Duration>,
    /// Whether inbound channels run the monitor too.
    pub keepalive_inbound: bool,
    /// Outbound handshake timeout.
    pub connect_timeout: Duration,
    /// Frame encoding for outgoing messages.
    pub frame_mode: FrameMode,
    /// Timing trace sink.
    pub trace_timing: TraceTiming,
    /// Largest incoming message, both on the wire and after inflation.
    pub max_message_size: usize,
    /// TLS client settings for `https` targets. `None` trusts the platform roots.
    pub client_tls: Option<Arc<ClientConfig>>,
}

impl ChannelConfig {
    /// WebSocket protocol limits for handshakes made with this config.
    pub fn ws_config(&self) -> WebSocketConfig {
        WebSocketConfig::default().max_message_size(Some(self.max_message_size))
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Some(Duration::from_millis(
                wirelink_settings::DEFAULT_KEEPALIVE_MS,
            )),
            keepalive_inbound: false,
            connect_timeout: Duration::from_millis(wirelink_settings::DEFAULT_CONNECT_TIMEOUT_MS),
            frame_mode: FrameMode::Text,
            trace_timing: TraceTiming::Off,
            max_message_size: crate::codec::MAX_MESSAGE_SIZE,
            client_tls: None,
        }
    }
}

/// Listener settings for one factory.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Whether the factory accepts inbound connections.
    pub enabled: bool,
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// TLS material, used when the protocol is secure.
    pub tls: TlsSettings,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".into(),
            port: wirelink_settings::DEFAULT_HTTP_PORT,
            tls: TlsSettings::default(),
        }
    }
}

/// Everything a [`ChannelFactory`](crate::ChannelFactory) needs.
#[derive(Clone, Debug)]
pub struct FactoryConfig {
    /// Served protocol.
    pub protocol: Protocol,
    /// Channel behaviour.
    pub channel: ChannelConfig,
    /// Listener behaviour.
    pub listener: ListenerConfig,
}

impl FactoryConfig {
    /// Derive the configuration of the `protocol` factory from settings.
    pub fn from_settings(settings: &TransportSettings, protocol: Protocol) -> Self {
        let port = match protocol {
            Protocol::Http => settings.http_port,
            Protocol::Https => settings.https_port,
        };
        Self {
            protocol,
            channel: ChannelConfig {
                keepalive_interval: settings.keepalive_interval(),
                keepalive_inbound: settings.keepalive_inbound,
                connect_timeout: settings.connect_timeout(),
                frame_mode: settings.frame_mode,
                trace_timing: settings.trace_timing,
                ..ChannelConfig::default()
            },
            listener: ListenerConfig {
                enabled: settings.listen,
                host: settings.host.clone(),
                port,
                tls: settings.tls.clone(),
            },
        }
    }

    /// Plain-HTTP factory listening on `host:port` with default channel settings.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: Protocol::Http,
            channel: ChannelConfig::default(),
            listener: ListenerConfig {
                enabled: true,
                host: host.into(),
                port,
                tls: TlsSettings::default(),
            },
        }
    }
}
