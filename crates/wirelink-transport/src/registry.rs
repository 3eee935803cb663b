//! Server-side connection registry.
//!
//! All inbound sockets of a listener share one registry. Socket events are
//! dispatched here by connection id and forwarded to the matching channel.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::channel::{Channel, ChannelEvent};

/// Identifier of one accepted socket.
pub type ConnectionId = u64;

/// Maps live inbound sockets to their channels.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    channels: DashMap<ConnectionId, Arc<Channel>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the channel of a newly opened socket.
    pub fn open(&self, id: ConnectionId, channel: Arc<Channel>) {
        debug!(connection_id = id, channel_id = %channel.id(), "connection registered");
        let _ = self.channels.insert(id, channel);
    }

    /// Forward `event` to the channel registered under `id`.
    ///
    /// Events for unknown ids are dropped. A terminal event also removes the
    /// entry.
    pub async fn dispatch(&self, id: ConnectionId, event: ChannelEvent) {
        let terminal = matches!(event, ChannelEvent::Closed { .. } | ChannelEvent::Failed(_));
        // clone out so the shard lock is not held across the await
        let Some(channel) = self.get(id) else {
            debug!(connection_id = id, "event for unknown connection dropped");
            return;
        };
        channel.handle_event(event).await;
        if terminal {
            let _ = self.remove(id);
        }
    }

    /// Drop the entry for `id`, returning its channel.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Channel>> {
        self.channels.remove(&id).map(|(_, channel)| channel)
    }

    /// Channel registered under `id`.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Channel>> {
        self.channels.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Snapshot of all live channels.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use crate::config::{ChannelConfig, Protocol};
    use crate::message::Message;
    use crate::test_support::{RecordingEndpoint, ws_pair};
    use crate::channel::ChannelState;

    async fn registered_channel(
        registry: &ConnectionRegistry,
        id: ConnectionId,
    ) -> (Arc<Channel>, Arc<RecordingEndpoint>) {
        let (_client, server) = ws_pair().await;
        let config = ChannelConfig {
            keepalive_interval: None,
            ..ChannelConfig::default()
        };
        let (channel, _events) = Channel::open(
            server,
            Protocol::Http,
            "http://0.0.0.0:80".into(),
            format!("http://10.0.0.{id}:5000"),
            &config,
        );
        let endpoint = RecordingEndpoint::new();
        channel.bind(endpoint.clone());
        registry.open(id, Arc::clone(&channel));
        (channel, endpoint)
    }

    #[tokio::test]
    async fn dispatch_routes_by_id() {
        let registry = ConnectionRegistry::new();
        let (_a, endpoint_a) = registered_channel(&registry, 1).await;
        let (_b, endpoint_b) = registered_channel(&registry, 2).await;
        assert_eq!(registry.len(), 2);

        let msg = Message::new(4, 11, &b"to-b"[..]);
        let frame = FrameCodec::default().encode(&msg).unwrap();
        registry.dispatch(2, ChannelEvent::Frame(frame)).await;

        assert!(endpoint_a.messages().is_empty());
        assert_eq!(endpoint_b.messages(), vec![msg]);
    }

    #[tokio::test]
    async fn unknown_id_is_dropped() {
        let registry = ConnectionRegistry::new();
        let (_a, endpoint) = registered_channel(&registry, 1).await;
        let frame = FrameCodec::default()
            .encode(&Message::new(1, 1, &b"x"[..]))
            .unwrap();
        registry.dispatch(99, ChannelEvent::Frame(frame)).await;
        assert!(endpoint.messages().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn close_event_removes_entry_and_disposes() {
        let registry = ConnectionRegistry::new();
        let (channel, endpoint) = registered_channel(&registry, 7).await;
        registry.dispatch(7, ChannelEvent::Closed { frame: None }).await;

        assert!(registry.is_empty());
        assert!(registry.get(7).is_none());
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(endpoint.dispose_count(), 1);
    }

    #[tokio::test]
    async fn snapshot_lists_all_channels() {
        let registry = ConnectionRegistry::new();
        let _ = registered_channel(&registry, 1).await;
        let _ = registered_channel(&registry, 2).await;
        assert_eq!(registry.channels().len(), 2);
        assert!(registry.remove(1).is_some());
        assert!(registry.remove(1).is_none());
        assert_eq!(registry.len(), 1);
    }
}
