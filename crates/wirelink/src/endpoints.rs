//! Endpoints used by the command line.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{info, warn};
use wirelink_transport::{Channel, ChannelEndpoint, EndpointFactory, Message};

/// Printable form of a payload: UTF-8 when possible, else a byte count.
pub fn render_payload(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<{} bytes>", payload.len()),
    }
}

/// Creates a [`ServeEndpoint`] for every accepted channel.
pub struct ServeEndpoints {
    echo: bool,
}

impl ServeEndpoints {
    pub fn new(echo: bool) -> Self {
        Self { echo }
    }
}

#[async_trait]
impl EndpointFactory for ServeEndpoints {
    async fn create_endpoint(&self, channel: Arc<Channel>) -> Arc<dyn ChannelEndpoint> {
        Arc::new(ServeEndpoint {
            channel: Arc::downgrade(&channel),
            echo: self.echo,
        })
    }
}

/// Logs every message and optionally sends it back.
pub struct ServeEndpoint {
    channel: Weak<Channel>,
    echo: bool,
}

#[async_trait]
impl ChannelEndpoint for ServeEndpoint {
    async fn received_message(&self, message: Message) {
        let Some(channel) = self.channel.upgrade() else {
            return;
        };
        info!(
            channel_id = %channel.id(),
            remote = %channel.remote_address(),
            func_id = message.func_id,
            xid = message.xid,
            payload = %render_payload(&message.payload),
            "message received"
        );
        if self.echo {
            if let Err(e) = channel.send_message(&message).await {
                warn!(channel_id = %channel.id(), error = %e, "echo failed");
            }
        }
    }

    async fn dispose(&self) {
        if let Some(channel) = self.channel.upgrade() {
            info!(channel_id = %channel.id(), "channel disposed");
            channel.close().await;
        }
    }
}

/// Hands the first received message to a waiting caller.
pub struct ReplyEndpoint {
    reply: Mutex<Option<oneshot::Sender<Message>>>,
}

impl ReplyEndpoint {
    /// Endpoint plus the receiver its first message is delivered to.
    ///
    /// The receiver errors if the channel is disposed before a reply.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Message>) {
        let (tx, rx) = oneshot::channel();
        let endpoint = Arc::new(Self {
            reply: Mutex::new(Some(tx)),
        });
        (endpoint, rx)
    }
}

#[async_trait]
impl ChannelEndpoint for ReplyEndpoint {
    async fn received_message(&self, message: Message) {
        let Some(tx) = self.reply.lock().take() else {
            info!(xid = message.xid, "extra message ignored");
            return;
        };
        let _ = tx.send(message);
    }

    async fn dispose(&self) {
        drop(self.reply.lock().take());
    }
}
