//! Per-protocol channel factory: outbound connections plus an optional
//! inbound listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, instrument};
use wirelink_settings::TransportSettings;

use crate::channel::Channel;
use crate::config::{FactoryConfig, Protocol};
use crate::endpoint::{ChannelEndpoint, EndpointFactory};
use crate::error::{Result, TransportError};
use crate::listener::{self, ListenerHandle};
use crate::registry::ConnectionRegistry;

/// Creates channels for one protocol.
#[derive(Debug)]
pub struct ChannelFactory {
    config: FactoryConfig,
    registry: Arc<ConnectionRegistry>,
    active: AtomicBool,
    listener: tokio::sync::Mutex<Option<ListenerHandle>>,
    bound: parking_lot::Mutex<Option<SocketAddr>>,
}

impl ChannelFactory {
    /// Factory for `config`. Nothing is bound until [`activate`](Self::activate).
    pub fn new(config: FactoryConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            active: AtomicBool::new(false),
            listener: tokio::sync::Mutex::new(None),
            bound: parking_lot::Mutex::new(None),
        }
    }

    /// Protocol this factory serves.
    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    /// Factory configuration.
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Registry of inbound connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Open an outbound channel to `target` and bind it to `endpoint`.
    pub async fn get_connection(
        &self,
        endpoint: Arc<dyn ChannelEndpoint>,
        target: &str,
    ) -> Result<Arc<Channel>> {
        Channel::connect(endpoint, target, &self.config.channel).await
    }

    /// Start listening, if enabled, handing inbound channels to `endpoints`.
    #[instrument(skip_all, fields(protocol = %self.config.protocol))]
    pub async fn activate(&self, endpoints: Arc<dyn EndpointFactory>) -> Result<()> {
        let mut slot = self.listener.lock().await;
        if self.active.load(Ordering::Acquire) {
            return Err(TransportError::Configuration(format!(
                "{} factory is already active",
                self.config.protocol
            )));
        }
        if self.config.listener.enabled {
            let handle =
                listener::start(&self.config, endpoints, Arc::clone(&self.registry)).await?;
            *self.bound.lock() = Some(handle.local_addr());
            *slot = Some(handle);
        } else {
            info!("listening disabled, outbound only");
        }
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop accepting inbound connections. Open channels are unaffected.
    pub async fn deactivate(&self) {
        let handle = self.listener.lock().await.take();
        let _ = self.bound.lock().take();
        self.active.store(false, Ordering::Release);
        if let Some(handle) = handle {
            handle.stop().await;
            info!(protocol = %self.config.protocol, "factory deactivated");
        }
    }

    /// Whether [`activate`](Self::activate) succeeded and no deactivation followed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Bound listener address while active.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock()
    }

    /// Port inbound peers should use for `protocol`.
    ///
    /// The bound port while active, else the configured port when listening
    /// is enabled, else `0`. Any other protocol yields `0`.
    pub fn listening_port(&self, protocol: Protocol) -> u16 {
        if protocol != self.config.protocol {
            return 0;
        }
        if let Some(addr) = self.local_addr() {
            return addr.port();
        }
        if self.config.listener.enabled {
            self.config.listener.port
        } else {
            0
        }
    }
}

/// Build the factories `settings` registers: `http` first, then `https`.
pub fn factories_from_settings(settings: &TransportSettings) -> Vec<ChannelFactory> {
    [
        (settings.register_http, Protocol::Http),
        (settings.register_https, Protocol::Https),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .map(|(_, protocol)| ChannelFactory::new(FactoryConfig::from_settings(settings, protocol)))
    .collect()
}
