//! Frame encoding: one serialized message per WebSocket frame.
//!
//! Text mode gzips the serialized message and base64-encodes the result.
//! Binary mode sends the serialized bytes unchanged. Decoding is driven by
//! the frame kind that arrived, so a receiver accepts both.

use std::io::{Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use wirelink_settings::FrameMode;

use crate::error::DecodeError;
use crate::message::Message;
use crate::timing::TimingTrace;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest message accepted, in bytes. Same as the WebSocket layer's default
/// incoming message limit.
pub const MAX_MESSAGE_SIZE: usize = 64 << 20;

/// Encodes outgoing messages and decodes incoming frames.
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    mode: FrameMode,
    timing: TimingTrace,
    max_message_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(FrameMode::default(), TimingTrace::default())
    }
}

impl FrameCodec {
    /// Create a codec sending in `mode`.
    pub fn new(mode: FrameMode, timing: TimingTrace) -> Self {
        Self {
            mode,
            timing,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Cap the size a text frame may inflate to.
    #[must_use]
    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }

    /// Configured send mode.
    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// Largest message [`decode`](Self::decode) will inflate.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Serialize and encode `message` into exactly one data frame.
    pub fn encode(&self, message: &Message) -> std::io::Result<WsMessage> {
        let span = self
            .timing
            .start(|| format!("serialization funcId={};xid={}", message.func_id, message.xid));
        let bytes = message.to_bytes();
        span.stop(|| format!("serialization funcId={};xid={}", message.func_id, message.xid));

        match self.mode {
            FrameMode::Text => {
                let span = self
                    .timing
                    .start(|| format!("base64encoding byteslength={}", bytes.len()));
                let text = encode_text(&bytes)?;
                span.stop(|| format!("base64encoding stringLength={}", text.len()));
                Ok(WsMessage::Text(text.into()))
            }
            FrameMode::Binary => Ok(WsMessage::Binary(bytes)),
        }
    }

    /// Decode one data frame and parse the message inside it.
    pub fn decode(&self, frame: WsMessage) -> Result<Message, DecodeError> {
        let bytes = match frame {
            WsMessage::Text(text) => {
                let span = self
                    .timing
                    .start(|| format!("base64decode message length={}", text.len()));
                let bytes = decode_text(text.as_str(), self.max_message_size)?;
                span.stop(|| format!("base64decode bytesDecoded={}", bytes.len()));
                bytes
            }
            WsMessage::Binary(bytes) => bytes,
            WsMessage::Ping(_) => return Err(DecodeError::UnexpectedFrame("ping")),
            WsMessage::Pong(_) => return Err(DecodeError::UnexpectedFrame("pong")),
            WsMessage::Close(_) => return Err(DecodeError::UnexpectedFrame("close")),
            WsMessage::Frame(_) => return Err(DecodeError::UnexpectedFrame("raw")),
        };

        let span = self.timing.start(|| "message.parse".to_string());
        let message = Message::parse(bytes)?;
        span.stop(|| format!("message.parse funcId={};xid={}", message.func_id, message.xid));
        Ok(message)
    }
}

/// Gzip then base64.
pub fn encode_text(bytes: &[u8]) -> std::io::Result<String> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2 + 32), Compression::default());
    encoder.write_all(bytes)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Base64 decode, then inflate when the gzip magic is present.
///
/// Plain base64 without compression is passed through. Inflation stops
/// with [`DecodeError::TooLarge`] once the output would exceed `limit`.
pub fn decode_text(text: &str, limit: usize) -> Result<Bytes, DecodeError> {
    let raw = STANDARD.decode(text.trim())?;
    if raw.len() < GZIP_MAGIC.len() || raw[..2] != GZIP_MAGIC {
        return Ok(Bytes::from(raw));
    }
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut inflated = Vec::with_capacity(raw.len().saturating_mul(2).min(limit));
    let _ = GzDecoder::new(raw.as_slice())
        .take(cap)
        .read_to_end(&mut inflated)
        .map_err(DecodeError::Gzip)?;
    if inflated.len() > limit {
        return Err(DecodeError::TooLarge { limit });
    }
    Ok(Bytes::from(inflated))
}
