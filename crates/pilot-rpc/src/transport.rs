//! Length-prefixed framing for remote control messages.
//!
//! Each frame is a 4-byte big-endian payload length followed by one JSON-RPC
//! message encoded as UTF-8 JSON:
//! ```text
//! +----------------+------------------+
//! |  4 bytes       |  N bytes         |
//! |  (length BE)   |  (JSON payload)  |
//! +----------------+------------------+
//! ```

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::Message;

/// Default upper bound on a single frame (16 MB). Config files travel inline.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX_SIZE: usize = 4;

/// Codec for length-prefixed JSON-RPC messages
#[derive(Debug)]
pub struct JsonRpcCodec {
    pending_len: Option<usize>,
    max_frame: usize,
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self {
            pending_len: None,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

impl JsonRpcCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a smaller frame limit, e.g. for clients that never send config content.
    #[must_use]
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            pending_len: None,
            max_frame: max_frame.min(u32::MAX as usize),
        }
    }

    #[must_use]
    pub fn max_frame(&self) -> usize {
        self.max_frame
    }
}

impl Decoder for JsonRpcCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.pending_len {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }
                let len = src.get_u32() as usize;
                if len > self.max_frame {
                    return Err(CodecError::FrameTooLarge {
                        len,
                        max: self.max_frame,
                    });
                }
                self.pending_len = Some(len);
                len
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let payload = src.split_to(len);
        self.pending_len = None;

        let text = std::str::from_utf8(&payload)?;
        Ok(Some(serde_json::from_str(text)?))
    }
}

impl Encoder<Message> for JsonRpcCodec {
    type Error = CodecError;

    // Payload length is bounded by max_frame, which never exceeds u32::MAX
    #[allow(clippy::cast_possible_truncation)]
    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;

        if payload.len() > self.max_frame {
            return Err(CodecError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame,
            });
        }

        dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);

        Ok(())
    }
}

/// Errors that can occur while framing messages
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Frame too large: {len} bytes (max: {max})")]
    FrameTooLarge { len: usize, max: usize },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::cast_possible_truncation)]

    use super::*;
    use crate::commands::{metadata_to_params, server_stopped_notification, Metadata};
    use crate::protocol::{Request, Response};

    fn start_request(id: u64) -> Message {
        let mut metadata = Metadata::new();
        metadata.insert("ConfigFileName".into(), "setup.xml".into());
        Message::Request(Request::new(
            "StartServer",
            Some(metadata_to_params(&metadata)),
            id.into(),
        ))
    }

    #[test]
    fn test_command_survives_framing() {
        let mut codec = JsonRpcCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(start_request(1), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        let Message::Request(req) = decoded else {
            panic!("Expected Request");
        };
        assert_eq!(req.method, "StartServer");
        assert_eq!(req.params.unwrap()["ConfigFileName"], "setup.xml");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_notification_decodes_as_idless_request() {
        let mut codec = JsonRpcCodec::new();
        let mut buf = BytesMut::new();

        let n = server_stopped_notification("setup.xml");
        codec.encode(Message::Notification(n), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert!(decoded.is_notification());
        assert_eq!(decoded.method(), Some("ServerStopped"));
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let mut codec = JsonRpcCodec::new();
        let mut full = BytesMut::new();
        codec.encode(start_request(9), &mut full).unwrap();

        let mut partial = BytesMut::new();
        partial.extend_from_slice(&full[..3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[3..10]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[10..]);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut codec = JsonRpcCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(start_request(1), &mut buf).unwrap();
        codec
            .encode(
                Message::Response(Response::success(1.into(), serde_json::json!({}))),
                &mut buf,
            )
            .unwrap();

        assert!(codec.decode(&mut buf).unwrap().unwrap().is_request());
        assert!(codec.decode(&mut buf).unwrap().unwrap().is_response());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let mut codec = JsonRpcCodec::with_max_frame(64);
        let mut buf = BytesMut::new();
        buf.put_u32(65);

        let result = codec.decode(&mut buf);
        assert!(matches!(
            result,
            Err(CodecError::FrameTooLarge { len: 65, max: 64 })
        ));
    }

    #[test]
    fn test_oversized_payload_not_encoded() {
        let mut codec = JsonRpcCodec::with_max_frame(16);
        let mut buf = BytesMut::new();

        let result = codec.encode(start_request(1), &mut buf);
        assert!(matches!(result, Err(CodecError::FrameTooLarge { .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_payloads() {
        let mut codec = JsonRpcCodec::new();

        let mut buf = BytesMut::new();
        buf.put_u32(4);
        buf.extend_from_slice(b"nope");
        assert!(matches!(codec.decode(&mut buf), Err(CodecError::Json(_))));

        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.extend_from_slice(&[0xff, 0xfe]);
        assert!(matches!(codec.decode(&mut buf), Err(CodecError::Utf8(_))));
    }

    #[test]
    fn test_length_prefix_is_big_endian_payload_size() {
        let mut codec = JsonRpcCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(start_request(2), &mut buf).unwrap();

        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(length, buf.len() - 4);
    }

    #[test]
    fn test_frame_error_display() {
        let err = CodecError::FrameTooLarge { len: 20, max: 10 };
        assert_eq!(err.to_string(), "Frame too large: 20 bytes (max: 10)");
        assert_eq!(JsonRpcCodec::new().max_frame(), DEFAULT_MAX_FRAME);
    }
}
