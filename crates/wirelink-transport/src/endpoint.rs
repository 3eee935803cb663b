//! Collaborator traits implemented by the remoting layer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::channel::Channel;
use crate::message::Message;

/// Upper-layer consumer bound 1:1 to a [`Channel`].
#[async_trait]
pub trait ChannelEndpoint: Send + Sync {
    /// A decoded message arrived on the bound channel.
    async fn received_message(&self, message: Message);

    /// The channel is gone or unhealthy. Implementations usually close it.
    ///
    /// Called at most once per channel.
    async fn dispose(&self);
}

/// Creates endpoints for inbound channels.
#[async_trait]
pub trait EndpointFactory: Send + Sync {
    /// Create the endpoint that will serve `channel`.
    async fn create_endpoint(&self, channel: Arc<Channel>) -> Arc<dyn ChannelEndpoint>;
}
