//! # wirelink-transport
//!
//! Duplex, message-oriented channels over `WebSocket`.
//!
//! - Outbound connections via [`ChannelFactory::get_connection`], with a bounded handshake
//! - Inbound listener with optional TLS; one [`ConnectionRegistry`] per listener
//! - Frame codec: gzip + base64 text frames or raw binary frames
//! - Keepalive monitor that disposes unresponsive channels
//! - Optional `TIMING.*` trace lines around the send and receive paths

#![deny(unsafe_code)]

pub mod address;
pub mod channel;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod keepalive;
pub mod listener;
pub mod message;
pub mod metrics;
pub mod registry;
pub mod timing;

#[cfg(test)]
pub(crate) mod test_support;

pub use channel::{Channel, ChannelEvent, ChannelId, ChannelState};
pub use codec::FrameCodec;
pub use config::{ChannelConfig, FactoryConfig, ListenerConfig, Protocol};
pub use endpoint::{ChannelEndpoint, EndpointFactory};
pub use error::{DecodeError, Result, TransportError};
pub use factory::{ChannelFactory, factories_from_settings};
pub use keepalive::KeepaliveResult;
pub use message::Message;
pub use registry::{ConnectionId, ConnectionRegistry};
pub use timing::TimingTrace;
