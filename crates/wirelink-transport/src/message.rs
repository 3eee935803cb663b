//! Remoting messages as seen by the transport.
//!
//! The body is opaque. Only the two correlation ids are read, and only for
//! diagnostics.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::DecodeError;

/// Bytes occupied by `func_id` and `xid`.
pub const HEADER_LEN: usize = 5;

/// One application message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Remoting function id.
    pub func_id: u8,
    /// Transaction id correlating requests and replies.
    pub xid: u32,
    /// Serialized body.
    pub payload: Bytes,
}

impl Message {
    /// Create a message.
    pub fn new(func_id: u8, xid: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            func_id,
            xid,
            payload: payload.into(),
        }
    }

    /// Serialize as `[func_id][xid big-endian][payload]`.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(self.func_id);
        buf.put_u32(self.xid);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse the serialized form produced by [`Message::to_bytes`].
    pub fn parse(mut bytes: Bytes) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                len: bytes.len(),
                needed: HEADER_LEN,
            });
        }
        let func_id = bytes.get_u8();
        let xid = bytes.get_u32();
        Ok(Self {
            func_id,
            xid,
            payload: bytes,
        })
    }
}
