//! Mapping between channel addresses and WebSocket URIs.

use std::net::SocketAddr;

use tokio_tungstenite::tungstenite::http::Uri;

use crate::config::Protocol;
use crate::error::{Result, TransportError};

/// An outbound target resolved to its WebSocket form.
#[derive(Clone, Debug)]
pub struct Target {
    /// Protocol selected by the URI scheme.
    pub protocol: Protocol,
    /// `ws://` or `wss://` URI handed to the handshake.
    pub ws_uri: Uri,
    /// The URI as the caller wrote it; used as the channel's remote address.
    pub original: String,
}

/// Resolve `http[s]://host:port[/path]` (or `ws[s]://…`) to its WebSocket URI.
///
/// Host and port are kept verbatim; an empty path becomes `/`.
pub fn resolve_target(uri: &str) -> Result<Target> {
    let invalid = |reason: &str| TransportError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    let parsed: Uri = uri.parse().map_err(|_| invalid("not a valid URI"))?;
    let scheme = parsed.scheme_str().ok_or_else(|| invalid("missing scheme"))?;
    let protocol =
        Protocol::from_scheme(scheme).ok_or_else(|| invalid("scheme must be http, https, ws or wss"))?;
    let authority = parsed
        .authority()
        .ok_or_else(|| invalid("missing host"))?
        .clone();
    let path = parsed
        .path_and_query()
        .map_or("/", |pq| pq.as_str())
        .to_string();

    let ws_uri = Uri::builder()
        .scheme(protocol.ws_scheme())
        .authority(authority)
        .path_and_query(if path.is_empty() { "/".to_string() } else { path })
        .build()
        .map_err(|_| invalid("could not build WebSocket URI"))?;

    Ok(Target {
        protocol,
        ws_uri,
        original: uri.to_string(),
    })
}

/// Channel address for a socket endpoint, e.g. `http://10.0.0.5:9000`.
pub fn socket_uri(protocol: Protocol, addr: SocketAddr) -> String {
    format!("{protocol}://{addr}")
}
