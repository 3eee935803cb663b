//! Inbound listener: accepts sockets, performs TLS and WebSocket handshakes
//! and registers one channel per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics::counter;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wirelink_settings::TlsSettings;

use crate::channel::{Channel, pump_events};
use crate::config::{ChannelConfig, FactoryConfig, Protocol};
use crate::endpoint::EndpointFactory;
use crate::error::{Result, TransportError};
use crate::metrics as names;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// Build a TLS acceptor from the configured PEM certificate chain and key.
pub fn tls_acceptor(tls: &TlsSettings) -> Result<TlsAcceptor> {
    let (Some(cert_path), Some(key_path)) = (&tls.cert_path, &tls.key_path) else {
        return Err(TransportError::Configuration(
            "https listener requires tls.certPath and tls.keyPath".into(),
        ));
    };
    let invalid = |what: &str, e: &dyn std::fmt::Display| {
        TransportError::Configuration(format!("{what}: {e}"))
    };

    let certs = CertificateDer::pem_file_iter(cert_path)
        .map_err(|e| invalid(&format!("cannot read {}", cert_path.display()), &e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| invalid(&format!("bad certificate in {}", cert_path.display()), &e))?;
    if certs.is_empty() {
        return Err(TransportError::Configuration(format!(
            "no certificate found in {}",
            cert_path.display()
        )));
    }
    let key = PrivateKeyDer::from_pem_file(key_path)
        .map_err(|e| invalid(&format!("cannot read key {}", key_path.display()), &e))?;

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| invalid("tls protocol setup", &e))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| invalid("certificate and key rejected", &e))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// A running accept loop.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and release the port. Established channels are untouched.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "accept loop ended abnormally");
        }
    }
}

struct AcceptContext {
    protocol: Protocol,
    channel: ChannelConfig,
    acceptor: Option<TlsAcceptor>,
    factory: Arc<dyn EndpointFactory>,
    registry: Arc<ConnectionRegistry>,
}

/// Bind the listener described by `config` and start accepting.
pub async fn start(
    config: &FactoryConfig,
    factory: Arc<dyn EndpointFactory>,
    registry: Arc<ConnectionRegistry>,
) -> Result<ListenerHandle> {
    let acceptor = if config.protocol.is_secure() {
        Some(tls_acceptor(&config.listener.tls)?)
    } else {
        None
    };

    let listener = TcpListener::bind((config.listener.host.as_str(), config.listener.port)).await?;
    let local_addr = listener.local_addr()?;
    info!(protocol = %config.protocol, %local_addr, "listener started");

    let ctx = Arc::new(AcceptContext {
        protocol: config.protocol,
        channel: config.channel.clone(),
        acceptor,
        factory,
        registry,
    });
    let cancel = CancellationToken::new();
    let task = tokio::spawn(accept_loop(listener, ctx, cancel.clone()));

    Ok(ListenerHandle {
        local_addr,
        cancel,
        task,
    })
}

async fn accept_loop(listener: TcpListener, ctx: Arc<AcceptContext>, cancel: CancellationToken) {
    let mut next_id: ConnectionId = 0;
    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((tcp, peer)) => {
                next_id += 1;
                let _ = tokio::spawn(serve_connection(tcp, peer, next_id, Arc::clone(&ctx)));
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
    info!(protocol = %ctx.protocol, "listener stopped");
}

async fn serve_connection(tcp: TcpStream, peer: SocketAddr, id: ConnectionId, ctx: Arc<AcceptContext>) {
    let local = match tcp.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(%peer, error = %e, "accepted socket has no local address");
            return;
        }
    };

    match &ctx.acceptor {
        Some(acceptor) => {
            let handshake = tokio::time::timeout(ctx.channel.connect_timeout, acceptor.accept(tcp));
            match handshake.await {
                Ok(Ok(tls)) => run_socket(tls, local, peer, id, &ctx).await,
                Ok(Err(e)) => handshake_failed(peer, "tls", &e),
                Err(e) => handshake_failed(peer, "tls", &e),
            }
        }
        None => run_socket(tcp, local, peer, id, &ctx).await,
    }
}

async fn run_socket<S>(stream: S, local: SocketAddr, peer: SocketAddr, id: ConnectionId, ctx: &AcceptContext)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let upgrade = tokio::time::timeout(
        ctx.channel.connect_timeout,
        tokio_tungstenite::accept_async_with_config(stream, Some(ctx.channel.ws_config())),
    );
    let ws = match upgrade.await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => return handshake_failed(peer, "websocket", &e),
        Err(e) => return handshake_failed(peer, "websocket", &e),
    };

    let (channel, events) = Channel::inbound(ws, ctx.protocol, local, peer, &ctx.channel);
    let endpoint = ctx.factory.create_endpoint(Arc::clone(&channel)).await;
    channel.bind(endpoint);
    ctx.registry.open(id, Arc::clone(&channel));
    info!(connection_id = id, channel_id = %channel.id(), remote = %channel.remote_address(), "channel accepted");

    if ctx.channel.keepalive_inbound {
        if let Some(interval) = ctx.channel.keepalive_interval {
            channel.start_keepalive(interval);
        }
    }

    let registry = Arc::clone(&ctx.registry);
    pump_events(events, channel.cancellation(), |event| {
        let registry = Arc::clone(&registry);
        async move { registry.dispatch(id, event).await }
    })
    .await;

    if ctx.registry.remove(id).is_some() {
        debug!(connection_id = id, "connection deregistered after reader exit");
    }
}

fn handshake_failed(peer: SocketAddr, stage: &'static str, error: &dyn std::fmt::Display) {
    counter!(names::HANDSHAKE_FAILURES_TOTAL, "stage" => stage).increment(1);
    warn!(%peer, stage, error = %error, "inbound handshake failed");
}
