//! hpfeeds wire framing.
//!
//! Every frame is `u32 total_length (big endian) | u8 opcode | body`, where
//! `total_length` includes the 5-byte header. Short strings inside a body are
//! length-prefixed with a single byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};

use crate::error::FeedError;

pub const OP_ERROR: u8 = 0;
pub const OP_INFO: u8 = 1;
pub const OP_AUTH: u8 = 2;
pub const OP_PUBLISH: u8 = 3;
pub const OP_SUBSCRIBE: u8 = 4;
pub const OP_UNSUBSCRIBE: u8 = 5;

const HEADER_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Error(String),
    /// Sent by the broker right after accept: broker name and auth nonce.
    Info { name: String, nonce: Bytes },
    Auth { ident: String, digest: Bytes },
    Publish {
        ident: String,
        channel: String,
        payload: Bytes,
    },
    Subscribe { ident: String, channel: String },
    Unsubscribe { ident: String, channel: String },
}

/// `sha1(nonce || secret)`, the proof sent in an auth frame.
pub fn auth_digest(nonce: &[u8], secret: &str) -> Bytes {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(secret.as_bytes());
    Bytes::copy_from_slice(&hasher.finalize())
}

fn put_str8(dst: &mut BytesMut, value: &str) -> Result<(), FeedError> {
    let len = u8::try_from(value.len()).map_err(|_| {
        FeedError::Protocol(format!("string too long for frame: {} bytes", value.len()))
    })?;
    dst.put_u8(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}

fn take_str8(body: &mut Bytes) -> Result<String, FeedError> {
    if body.is_empty() {
        return Err(FeedError::Protocol("truncated string length".to_string()));
    }
    let len = body.get_u8() as usize;
    if body.len() < len {
        return Err(FeedError::Protocol("truncated string".to_string()));
    }
    let raw = body.split_to(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| FeedError::Protocol(format!("invalid utf-8 in frame: {e}")))
}

fn take_rest_str(body: Bytes) -> String {
    String::from_utf8_lossy(&body).into_owned()
}

impl Frame {
    pub fn opcode(&self) -> u8 {
        match self {
            Frame::Error(_) => OP_ERROR,
            Frame::Info { .. } => OP_INFO,
            Frame::Auth { .. } => OP_AUTH,
            Frame::Publish { .. } => OP_PUBLISH,
            Frame::Subscribe { .. } => OP_SUBSCRIBE,
            Frame::Unsubscribe { .. } => OP_UNSUBSCRIBE,
        }
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), FeedError> {
        let mut body = BytesMut::new();
        match self {
            Frame::Error(message) => body.put_slice(message.as_bytes()),
            Frame::Info { name, nonce } => {
                put_str8(&mut body, name)?;
                body.put_slice(nonce);
            }
            Frame::Auth { ident, digest } => {
                put_str8(&mut body, ident)?;
                body.put_slice(digest);
            }
            Frame::Publish {
                ident,
                channel,
                payload,
            } => {
                put_str8(&mut body, ident)?;
                put_str8(&mut body, channel)?;
                body.put_slice(payload);
            }
            Frame::Subscribe { ident, channel } | Frame::Unsubscribe { ident, channel } => {
                put_str8(&mut body, ident)?;
                body.put_slice(channel.as_bytes());
            }
        }

        let total = HEADER_LEN + body.len();
        let total = u32::try_from(total)
            .map_err(|_| FeedError::FrameTooLarge { size: total, max: u32::MAX as usize })?;
        dst.reserve(total as usize);
        dst.put_u32(total);
        dst.put_u8(self.opcode());
        dst.put_slice(&body);
        Ok(())
    }

    /// Try to take one complete frame off the front of `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; `src` is left untouched
    /// in that case.
    pub fn decode(src: &mut BytesMut, max_len: usize) -> Result<Option<Frame>, FeedError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let total = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if total < HEADER_LEN {
            return Err(FeedError::Protocol(format!("invalid frame length {total}")));
        }
        if total > max_len {
            return Err(FeedError::FrameTooLarge {
                size: total,
                max: max_len,
            });
        }
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total).freeze();
        frame.advance(4);
        let opcode = frame.get_u8();
        let mut body = frame;

        let decoded = match opcode {
            OP_ERROR => Frame::Error(take_rest_str(body)),
            OP_INFO => {
                let name = take_str8(&mut body)?;
                Frame::Info { name, nonce: body }
            }
            OP_AUTH => {
                let ident = take_str8(&mut body)?;
                Frame::Auth {
                    ident,
                    digest: body,
                }
            }
            OP_PUBLISH => {
                let ident = take_str8(&mut body)?;
                let channel = take_str8(&mut body)?;
                Frame::Publish {
                    ident,
                    channel,
                    payload: body,
                }
            }
            OP_SUBSCRIBE => {
                let ident = take_str8(&mut body)?;
                Frame::Subscribe {
                    ident,
                    channel: take_rest_str(body),
                }
            }
            OP_UNSUBSCRIBE => {
                let ident = take_str8(&mut body)?;
                Frame::Unsubscribe {
                    ident,
                    channel: take_rest_str(body),
                }
            }
            other => return Err(FeedError::Protocol(format!("unknown opcode {other}"))),
        };
        Ok(Some(decoded))
    }
}
