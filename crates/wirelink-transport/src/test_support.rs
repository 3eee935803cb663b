//! Helpers shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio_tungstenite::WebSocketStream;

use crate::channel::Channel;
use crate::config::{ChannelConfig, Protocol};
use crate::endpoint::ChannelEndpoint;
use crate::message::Message;

/// Connected client/server WebSocket pair over an in-memory pipe.
pub(crate) async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (client, server) = tokio::join!(
        tokio_tungstenite::client_async("ws://localhost/", client_io),
        tokio_tungstenite::accept_async(server_io),
    );
    (client.unwrap().0, server.unwrap())
}

/// An Open, bound client channel whose reader is running, plus the raw peer.
pub(crate) async fn open_client_channel(
    config: ChannelConfig,
) -> (
    Arc<Channel>,
    WebSocketStream<DuplexStream>,
    Arc<RecordingEndpoint>,
) {
    let (client, server) = ws_pair().await;
    let (channel, events) = Channel::open(
        client,
        Protocol::Http,
        "http://127.0.0.1:50000".into(),
        "http://localhost:80".into(),
        &config,
    );
    let endpoint = RecordingEndpoint::new();
    channel.bind(endpoint.clone());
    channel.spawn_reader(events);
    if let Some(interval) = config.keepalive_interval {
        channel.start_keepalive(interval);
    }
    (channel, server, endpoint)
}

/// Endpoint that records everything it is handed.
#[derive(Default)]
pub(crate) struct RecordingEndpoint {
    messages: Mutex<Vec<Message>>,
    disposals: AtomicUsize,
}

impl RecordingEndpoint {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub(crate) fn dispose_count(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    /// Wait up to five seconds for `n` messages.
    pub(crate) async fn wait_for_messages(&self, n: usize) -> Vec<Message> {
        for _ in 0..500 {
            let messages = self.messages();
            if messages.len() >= n {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} messages, got {:?}", self.messages());
    }

    /// Wait up to five seconds for the first disposal.
    pub(crate) async fn wait_for_disposal(&self) {
        for _ in 0..500 {
            if self.dispose_count() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("endpoint was never disposed");
    }
}

#[async_trait]
impl ChannelEndpoint for RecordingEndpoint {
    async fn received_message(&self, message: Message) {
        self.messages.lock().push(message);
    }

    async fn dispose(&self) {
        let _ = self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}
