//! One duplex message channel over a WebSocket connection.
//!
//! A [`Channel`] owns the write half of its socket. The read half is pumped
//! by a separate task that turns socket activity into [`ChannelEvent`]s and
//! feeds them back into the channel (outbound) or into the
//! [`ConnectionRegistry`](crate::ConnectionRegistry) (inbound).
//!
//! ## State machine
//!
//! `Connecting → Open → Closing → Closed`, or straight to `Closed` when the
//! peer closes or the socket fails. Outbound channels are only constructed
//! once the handshake succeeded, so callers never see `Connecting`.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::address::{resolve_target, socket_uri};
use crate::codec::FrameCodec;
use crate::config::{ChannelConfig, Protocol};
use crate::endpoint::ChannelEndpoint;
use crate::error::{Result, TransportError};
use crate::keepalive::{self, KeepaliveState};
use crate::message::Message;
use crate::metrics as names;
use crate::timing::TimingTrace;

/// How long a closing channel keeps reading while waiting for the peer's
/// close reply.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Write half of a WebSocket, erased over the underlying stream type.
pub type WsSink = Box<dyn Sink<WsMessage, Error = WsError> + Send + Unpin>;

/// Read half of a WebSocket, erased over the underlying stream type.
pub type WsEvents = Box<dyn Stream<Item = std::result::Result<WsMessage, WsError>> + Send + Unpin>;

/// Split a WebSocket into boxed halves.
pub fn split_socket<S>(ws: WebSocketStream<S>) -> (WsSink, WsEvents)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();
    (Box::new(sink), Box::new(stream))
}

/// Unique channel identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

impl Default for ChannelId {
    fn default() -> Self {
        Self(format!("chan_{}", Uuid::now_v7()))
    }
}

impl ChannelId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Handshake in progress.
    Connecting,
    /// Frames flow in both directions.
    Open,
    /// A close frame is being written.
    Closing,
    /// No further frames are sent or delivered.
    Closed,
}

/// Socket activity delivered to a channel, in transport order.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A text or binary data frame.
    Frame(WsMessage),
    /// A pong control frame with its payload.
    Pong(Bytes),
    /// The connection ended: peer close frame, end of stream, or local
    /// close that finished draining.
    Closed {
        /// Close frame sent by the peer, if any.
        frame: Option<CloseFrame>,
    },
    /// The socket failed.
    Failed(WsError),
}

impl ChannelEvent {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Failed(_))
    }
}

/// A duplex, message-oriented connection to one peer.
pub struct Channel {
    id: ChannelId,
    protocol: Protocol,
    local_address: String,
    remote_address: String,
    state: Mutex<ChannelState>,
    endpoint: RwLock<Option<Arc<dyn ChannelEndpoint>>>,
    sink: tokio::sync::Mutex<WsSink>,
    codec: FrameCodec,
    timing: TimingTrace,
    keepalive: KeepaliveState,
    cancel: CancellationToken,
    disposed: AtomicBool,
    released: AtomicBool,
    opened_at: Instant,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("local_address", &self.local_address)
            .field("remote_address", &self.remote_address)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Wrap an established socket into an Open channel.
    ///
    /// Returns the channel and the read half, which the caller must pump.
    pub fn open<S>(
        ws: WebSocketStream<S>,
        protocol: Protocol,
        local_address: String,
        remote_address: String,
        config: &ChannelConfig,
    ) -> (Arc<Self>, WsEvents)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, events) = split_socket(ws);
        let timing = TimingTrace::new(config.trace_timing);
        let channel = Arc::new(Self {
            id: ChannelId::new(),
            protocol,
            local_address,
            remote_address,
            state: Mutex::new(ChannelState::Open),
            endpoint: RwLock::new(None),
            sink: tokio::sync::Mutex::new(sink),
            codec: FrameCodec::new(config.frame_mode, timing)
                .with_max_message_size(config.max_message_size),
            timing,
            keepalive: KeepaliveState::new(),
            cancel: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            released: AtomicBool::new(false),
            opened_at: Instant::now(),
        });
        gauge!(names::CHANNELS_ACTIVE).increment(1.0);
        (channel, events)
    }

    /// Wrap an accepted inbound socket. Addresses come from the socket endpoints.
    pub fn inbound<S>(
        ws: WebSocketStream<S>,
        protocol: Protocol,
        local: SocketAddr,
        peer: SocketAddr,
        config: &ChannelConfig,
    ) -> (Arc<Self>, WsEvents)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        counter!(names::CHANNELS_OPENED_TOTAL, "direction" => "inbound").increment(1);
        Self::open(
            ws,
            protocol,
            socket_uri(protocol, local),
            socket_uri(protocol, peer),
            config,
        )
    }

    /// Connect to `target` and return an Open channel bound to `endpoint`.
    ///
    /// The handshake is bounded by the configured connect timeout. On any
    /// failure no channel is created and [`TransportError::Connect`] is
    /// returned.
    #[instrument(skip(endpoint, config), fields(channel_id))]
    pub async fn connect(
        endpoint: Arc<dyn ChannelEndpoint>,
        target: &str,
        config: &ChannelConfig,
    ) -> Result<Arc<Self>> {
        let result = Self::handshake(target, config).await;
        let (ws, resolved) = match result {
            Ok(ok) => ok,
            Err(e) => {
                counter!(names::CONNECT_FAILURES_TOTAL).increment(1);
                error!(target, error = %e, "could not connect");
                return Err(e);
            }
        };

        let local = local_socket_addr(ws.get_ref())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
        counter!(names::CHANNELS_OPENED_TOTAL, "direction" => "outbound").increment(1);
        let (channel, events) = Self::open(
            ws,
            resolved,
            socket_uri(resolved, local),
            target.to_string(),
            config,
        );
        let _ = tracing::Span::current().record("channel_id", channel.id.0.as_str());
        channel.bind(endpoint);
        channel.spawn_reader(events);
        if let Some(interval) = config.keepalive_interval {
            channel.start_keepalive(interval);
        }
        info!(remote = %channel.remote_address, local = %channel.local_address, "channel connected");
        Ok(channel)
    }

    async fn handshake(
        target: &str,
        config: &ChannelConfig,
    ) -> Result<(WebSocketStream<MaybeTlsStream<TcpStream>>, Protocol)> {
        let resolved = resolve_target(target).map_err(|e| TransportError::connect(target, e))?;
        let connecting = tokio_tungstenite::connect_async_tls_with_config(
            resolved.ws_uri.clone(),
            Some(config.ws_config()),
            false,
            config.client_tls.clone().map(Connector::Rustls),
        );
        match tokio::time::timeout(config.connect_timeout, connecting).await {
            Ok(Ok((ws, _response))) => Ok((ws, resolved.protocol)),
            Ok(Err(e)) => Err(TransportError::connect(target, e)),
            Err(elapsed) => Err(TransportError::connect(target, elapsed)),
        }
    }

    /// Channel id.
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Protocol (`http` or `https`) of the channel.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Local address as `protocol://ip:port`.
    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    /// Remote address. Outbound channels report the URI they were opened with.
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// Whether the channel is Open.
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Bind the endpoint that receives this channel's messages.
    pub fn bind(&self, endpoint: Arc<dyn ChannelEndpoint>) {
        *self.endpoint.write() = Some(endpoint);
    }

    /// Whether an endpoint is bound.
    pub fn is_bound(&self) -> bool {
        self.endpoint.read().is_some()
    }

    fn endpoint(&self) -> Option<Arc<dyn ChannelEndpoint>> {
        self.endpoint.read().clone()
    }

    pub(crate) fn keepalive(&self) -> &KeepaliveState {
        &self.keepalive
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serialize, encode and write `message` as one frame.
    ///
    /// No-op unless the channel is Open. Concurrent callers take turns on
    /// the write half, so frames never interleave.
    #[instrument(skip_all, fields(channel_id = %self.id, func_id = message.func_id, xid = message.xid))]
    pub async fn send_message(&self, message: &Message) -> Result<()> {
        let frame = self
            .codec
            .encode(message)
            .map_err(|e| TransportError::Send(WsError::Io(e)))?;

        let mut sink = self.sink.lock().await;
        if !self.is_open() {
            debug!(state = ?self.state(), "send on non-open channel ignored");
            return Ok(());
        }
        let span = self.timing.start(|| "socket send".to_string());
        sink.send(frame).await.map_err(TransportError::Send)?;
        span.stop(|| "socket send".to_string());
        counter!(names::FRAMES_SENT_TOTAL).increment(1);
        Ok(())
    }

    /// Decode an inbound data frame and hand the message to the endpoint.
    ///
    /// Frames that fail to decode are logged and dropped; the channel stays
    /// Open.
    pub async fn process_frame(&self, frame: WsMessage) {
        if !self.is_open() {
            return;
        }
        counter!(names::FRAMES_RECEIVED_TOTAL).increment(1);
        let message = match self.codec.decode(frame) {
            Ok(message) => message,
            Err(e) => {
                counter!(names::DECODE_FAILURES_TOTAL).increment(1);
                let err = TransportError::Decode(e);
                error!(channel_id = %self.id, remote = %self.remote_address, error = %err, "dropping undecodable frame");
                return;
            }
        };
        let Some(endpoint) = self.endpoint() else {
            warn!(
                channel_id = %self.id,
                func_id = message.func_id,
                xid = message.xid,
                "message arrived before an endpoint was bound, dropping"
            );
            return;
        };
        endpoint.received_message(message).await;
    }

    /// Close the channel with a normal-closure frame. Safe to call repeatedly.
    #[instrument(skip_all, fields(channel_id = %self.id))]
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state != ChannelState::Open {
                return;
            }
            *state = ChannelState::Closing;
        }
        self.cancel.cancel();

        let mut sink = self.sink.lock().await;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
            debug!(error = %e, "close frame not delivered");
        }
        drop(sink);
        let _ = self.mark_closed();
        debug!("channel closed locally");
    }

    /// Write a keepalive ping carrying `probe`.
    pub(crate) async fn send_ping(&self, probe: u64) -> Result<()> {
        let mut sink = self.sink.lock().await;
        if !self.is_open() {
            return Ok(());
        }
        sink.send(WsMessage::Ping(Bytes::copy_from_slice(&probe.to_be_bytes())))
            .await
            .map_err(TransportError::Send)
    }

    /// Dispatch one socket event into the state machine.
    pub async fn handle_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Frame(frame) => self.process_frame(frame).await,
            ChannelEvent::Pong(payload) => {
                if !self.keepalive.record_pong(&payload) {
                    debug!(channel_id = %self.id, "ignoring unmatched pong");
                }
            }
            ChannelEvent::Closed { frame } => {
                if self.mark_closed() {
                    debug!(
                        channel_id = %self.id,
                        code = ?frame.as_ref().map(|f| f.code),
                        "channel closed by peer"
                    );
                }
                self.release_socket().await;
                self.dispose().await;
            }
            ChannelEvent::Failed(e) => {
                warn!(channel_id = %self.id, remote = %self.remote_address, error = %e, "socket error");
                let _ = self.mark_closed();
                self.release_socket().await;
                self.dispose().await;
            }
        }
    }

    /// Ask the endpoint to dispose this channel. Runs at most once.
    ///
    /// Without a bound endpoint the channel closes itself.
    pub(crate) async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.endpoint() {
            Some(endpoint) => endpoint.dispose().await,
            None => self.close().await,
        }
    }

    /// Move to Closed. Returns `true` if this call made the transition.
    fn mark_closed(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == ChannelState::Closed {
                return false;
            }
            *state = ChannelState::Closed;
        }
        self.cancel.cancel();
        counter!(names::CHANNELS_CLOSED_TOTAL).increment(1);
        gauge!(names::CHANNELS_ACTIVE).decrement(1.0);
        histogram!(names::CHANNEL_DURATION_SECONDS).record(self.opened_at.elapsed().as_secs_f64());
        true
    }

    /// Flush any pending close reply and shut the write half, once.
    async fn release_socket(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(channel_id = %self.id, error = %e, "socket already released");
        }
    }

    /// Pump `events` straight into this channel.
    pub(crate) fn spawn_reader(self: &Arc<Self>, events: WsEvents) {
        let channel = Arc::clone(self);
        let _ = tokio::spawn(pump_events(events, self.cancellation(), move |event| {
            let channel = Arc::clone(&channel);
            async move { channel.handle_event(event).await }
        }));
    }

    /// Start the keepalive monitor for this channel.
    pub(crate) fn start_keepalive(self: &Arc<Self>, interval: Duration) {
        let _ = keepalive::spawn(Arc::clone(self), interval);
    }
}

/// Read `events` until the connection ends, handing each to `deliver`.
///
/// Once `cancel` fires the pump keeps reading for [`CLOSE_GRACE`] so the
/// peer's close reply can arrive, then reports `Closed` itself.
pub async fn pump_events<F, Fut>(mut events: WsEvents, cancel: CancellationToken, mut deliver: F)
where
    F: FnMut(ChannelEvent) -> Fut,
    Fut: Future<Output = ()>,
{
    let drained = async {
        cancel.cancelled().await;
        tokio::time::sleep(CLOSE_GRACE).await;
    };
    tokio::pin!(drained);

    loop {
        let next = tokio::select! {
            next = events.next() => next,
            () = &mut drained => {
                deliver(ChannelEvent::Closed { frame: None }).await;
                return;
            }
        };
        let event = match next {
            None | Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                ChannelEvent::Closed { frame: None }
            }
            Some(Ok(WsMessage::Close(frame))) => ChannelEvent::Closed { frame },
            Some(Ok(WsMessage::Pong(payload))) => ChannelEvent::Pong(payload),
            Some(Ok(frame @ (WsMessage::Text(_) | WsMessage::Binary(_)))) => {
                ChannelEvent::Frame(frame)
            }
            // pings are answered by tungstenite itself
            Some(Ok(WsMessage::Ping(_) | WsMessage::Frame(_))) => continue,
            Some(Err(e)) => ChannelEvent::Failed(e),
        };
        let terminal = event.is_terminal();
        deliver(event).await;
        if terminal {
            return;
        }
    }
}

fn local_socket_addr(stream: &MaybeTlsStream<TcpStream>) -> Option<SocketAddr> {
    match stream {
        MaybeTlsStream::Plain(tcp) => tcp.local_addr().ok(),
        MaybeTlsStream::Rustls(tls) => tls.get_ref().0.local_addr().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingEndpoint, open_client_channel, ws_pair};
    use wirelink_settings::FrameMode;

    fn no_keepalive() -> ChannelConfig {
        ChannelConfig {
            keepalive_interval: None,
            ..ChannelConfig::default()
        }
    }

    #[tokio::test]
    async fn new_channel_is_open_and_unbound() {
        let (client, _server) = ws_pair().await;
        let (channel, _events) = Channel::open(
            client,
            Protocol::Http,
            "http://127.0.0.1:1".into(),
            "http://127.0.0.1:2".into(),
            &no_keepalive(),
        );
        assert_eq!(channel.state(), ChannelState::Open);
        assert!(!channel.is_bound());
        assert_eq!(channel.protocol(), Protocol::Http);
        assert_eq!(channel.local_address(), "http://127.0.0.1:1");
        assert_eq!(channel.remote_address(), "http://127.0.0.1:2");
        assert!(channel.id().0.starts_with("chan_"));
    }

    #[tokio::test]
    async fn send_writes_one_text_frame() {
        let (channel, mut server, _endpoint) = open_client_channel(no_keepalive()).await;
        let msg = Message::new(1, 42, &b"abc"[..]);
        channel.send_message(&msg).await.unwrap();

        let frame = server.next().await.unwrap().unwrap();
        assert!(frame.is_text());
        let codec = FrameCodec::default();
        assert_eq!(codec.decode(frame).unwrap(), msg);
    }

    #[tokio::test]
    async fn binary_mode_writes_binary_frame() {
        let config = ChannelConfig {
            frame_mode: FrameMode::Binary,
            ..no_keepalive()
        };
        let (channel, mut server, _endpoint) = open_client_channel(config).await;
        let msg = Message::new(9, 7, &b"\x00\x01\xff"[..]);
        channel.send_message(&msg).await.unwrap();

        let frame = server.next().await.unwrap().unwrap();
        assert_eq!(frame, WsMessage::Binary(msg.to_bytes()));
    }

    #[tokio::test]
    async fn inbound_frames_reach_endpoint() {
        let (_channel, mut server, endpoint) = open_client_channel(no_keepalive()).await;
        let msg = Message::new(2, 5, &b"hello"[..]);
        server
            .send(FrameCodec::default().encode(&msg).unwrap())
            .await
            .unwrap();

        let received = endpoint.wait_for_messages(1).await;
        assert_eq!(received, vec![msg]);
    }

    #[tokio::test]
    async fn corrupt_frame_does_not_close_channel() {
        let (channel, mut server, endpoint) = open_client_channel(no_keepalive()).await;
        server.send(WsMessage::Text("!!corrupt!!".into())).await.unwrap();
        server
            .send(WsMessage::Binary(Bytes::from_static(&[1])))
            .await
            .unwrap();
        let valid = Message::new(3, 99, &b"after"[..]);
        server
            .send(FrameCodec::default().encode(&valid).unwrap())
            .await
            .unwrap();

        let received = endpoint.wait_for_messages(1).await;
        assert_eq!(received, vec![valid]);
        assert!(channel.is_open());
        assert_eq!(endpoint.dispose_count(), 0);
    }

    #[tokio::test]
    async fn frame_inflating_past_limit_is_dropped() {
        let config = ChannelConfig {
            max_message_size: 4096,
            ..no_keepalive()
        };
        let (channel, mut server, endpoint) = open_client_channel(config).await;
        // compresses to well under the limit, inflates far past it
        let bomb = Message::new(1, 1, vec![0u8; 1024 * 1024]);
        let frame = FrameCodec::default().encode(&bomb).unwrap();
        assert!(frame.len() < 4096);
        server.send(frame).await.unwrap();
        let valid = Message::new(1, 2, &b"small"[..]);
        server
            .send(FrameCodec::default().encode(&valid).unwrap())
            .await
            .unwrap();

        let received = endpoint.wait_for_messages(1).await;
        assert_eq!(received, vec![valid]);
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn frames_before_bind_are_dropped() {
        let (client, mut server) = ws_pair().await;
        let (channel, events) = Channel::open(
            client,
            Protocol::Http,
            "http://a:1".into(),
            "http://b:2".into(),
            &no_keepalive(),
        );
        channel.spawn_reader(events);

        let early = Message::new(1, 1, &b"early"[..]);
        server
            .send(FrameCodec::default().encode(&early).unwrap())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let endpoint = RecordingEndpoint::new();
        channel.bind(endpoint.clone());
        let late = Message::new(1, 2, &b"late"[..]);
        server
            .send(FrameCodec::default().encode(&late).unwrap())
            .await
            .unwrap();

        assert_eq!(endpoint.wait_for_messages(1).await, vec![late]);
    }

    #[tokio::test]
    async fn close_twice_is_safe() {
        let (channel, mut server, _endpoint) = open_client_channel(no_keepalive()).await;
        channel.close().await;
        channel.close().await;
        assert_eq!(channel.state(), ChannelState::Closed);

        let frame = server.next().await.unwrap().unwrap();
        let WsMessage::Close(Some(close)) = frame else {
            panic!("expected close frame, got {frame:?}");
        };
        assert_eq!(close.code, CloseCode::Normal);
    }

    #[tokio::test]
    async fn send_after_close_is_noop() {
        let (channel, _server, _endpoint) = open_client_channel(no_keepalive()).await;
        channel.close().await;
        let result = channel.send_message(&Message::new(1, 1, &b"x"[..])).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn remote_close_disposes_endpoint_once() {
        let (channel, mut server, endpoint) = open_client_channel(no_keepalive()).await;
        server.close(None).await.unwrap();

        endpoint.wait_for_disposal().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(endpoint.dispose_count(), 1);
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn local_close_disposes_once_after_handshake() {
        let (channel, mut server, endpoint) = open_client_channel(no_keepalive()).await;
        // keep the server side reading so it answers the close frame
        let _reader = tokio::spawn(async move { while server.next().await.is_some() {} });
        channel.close().await;
        channel.close().await;

        endpoint.wait_for_disposal().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(endpoint.dispose_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_sends_never_interleave() {
        let (channel, mut server, _endpoint) = open_client_channel(no_keepalive()).await;
        let mut tasks = Vec::new();
        for xid in 0..32u32 {
            let channel = Arc::clone(&channel);
            tasks.push(tokio::spawn(async move {
                let payload = vec![u8::try_from(xid).unwrap(); 16 * 1024];
                channel
                    .send_message(&Message::new(1, xid, payload))
                    .await
                    .unwrap();
            }));
        }

        let codec = FrameCodec::default();
        let mut seen = Vec::new();
        for _ in 0..32 {
            let frame = server.next().await.unwrap().unwrap();
            let msg = codec.decode(frame).unwrap();
            let fill = u8::try_from(msg.xid).unwrap();
            assert!(msg.payload.iter().all(|b| *b == fill));
            seen.push(msg.xid);
        }
        for task in tasks {
            task.await.unwrap();
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn pong_with_stale_probe_is_ignored() {
        let (channel, _server, _endpoint) = open_client_channel(no_keepalive()).await;
        let first = channel.keepalive().begin_probe();
        let _second = channel.keepalive().begin_probe();
        channel
            .handle_event(ChannelEvent::Pong(Bytes::copy_from_slice(&first.to_be_bytes())))
            .await;
        assert!(!channel.keepalive().pong_received());
    }

    #[tokio::test]
    async fn socket_failure_closes_and_disposes() {
        let (channel, _server, endpoint) = open_client_channel(no_keepalive()).await;
        channel
            .handle_event(ChannelEvent::Failed(WsError::Io(std::io::Error::other("reset"))))
            .await;
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(endpoint.dispose_count(), 1);
    }

    #[test]
    fn channel_id_unique() {
        let a = ChannelId::new();
        let b = ChannelId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.0);
    }
}
