//! # Wire Codec
//!
//! A frame is one discriminator byte followed by the serialized payload:
//!
//! ```text
//! ┌───────────────┬──────────────────────────────────────┐
//! │ kind (1 byte) │ payload (PayloadCodec::serialize)    │
//! │ 1 = request   │ {"c", "n", "a", "d"}                 │
//! │ 2 = response  │ {"s", "n", "a", "d"}                 │
//! └───────────────┴──────────────────────────────────────┘
//! ```
//!
//! Payloads pass through a dynamic `serde_json::Value` so the byte encoding
//! is pluggable without the codec knowing the payload structure. Decode
//! failures are values, never panics: the read loop must survive garbage.

use bytes::{BufMut, Bytes, BytesMut};
use rpc_types::{MessageKind, Request, Response};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A serializer or deserializer failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CodecError(pub String);

impl CodecError {
    pub fn new(reason: impl fmt::Display) -> Self {
        Self(reason.to_string())
    }
}

/// Errors turning bytes into frames and back.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame had no discriminator byte.
    #[error("Empty frame")]
    Empty,

    /// The discriminator byte is not a known message kind.
    #[error("Unknown payload type: {0}")]
    UnknownKind(u8),

    /// The payload bytes could not be deserialized.
    #[error("Could not deserialize payload: {0}")]
    Malformed(CodecError),

    /// The payload could not be serialized.
    #[error("Could not serialize payload: {0}")]
    Serialize(CodecError),

    /// The payload deserialized but does not have the expected shape.
    #[error("Invalid payload: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Pluggable payload encoding.
///
/// Both ends of a channel must use the same codec.
pub trait PayloadCodec: Send + Sync {
    fn serialize(&self, payload: &Value) -> Result<Vec<u8>, CodecError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Default codec: CBOR, a compact self-describing binary encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl PayloadCodec for CborCodec {
    fn serialize(&self, payload: &Value) -> Result<Vec<u8>, CodecError> {
        serde_cbor::to_vec(payload).map_err(CodecError::new)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_cbor::from_slice(bytes).map_err(CodecError::new)
    }

    fn name(&self) -> &'static str {
        "cbor"
    }
}

/// JSON text codec, for channels shared with tooling that speaks JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn serialize(&self, payload: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(payload).map_err(CodecError::new)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::new)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// User-supplied serialize function.
pub type SerializeFn = Arc<dyn Fn(&Value) -> Result<Vec<u8>, CodecError> + Send + Sync>;

/// User-supplied deserialize function.
pub type DeserializeFn = Arc<dyn Fn(&[u8]) -> Result<Value, CodecError> + Send + Sync>;

/// A codec built from a serialize/deserialize function pair.
#[derive(Clone)]
pub struct FnCodec {
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

impl FnCodec {
    pub fn new(serialize: SerializeFn, deserialize: DeserializeFn) -> Self {
        Self {
            serialize,
            deserialize,
        }
    }
}

impl PayloadCodec for FnCodec {
    fn serialize(&self, payload: &Value) -> Result<Vec<u8>, CodecError> {
        (self.serialize)(payload)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        (self.deserialize)(bytes)
    }
}

impl fmt::Debug for FnCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCodec").finish_non_exhaustive()
    }
}

/// A decoded frame whose payload has not been given a type yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub kind: MessageKind,
    pub payload: Value,
}

/// Prefix the discriminator to a serialized payload.
pub fn encode(
    codec: &dyn PayloadCodec,
    kind: MessageKind,
    payload: &Value,
) -> Result<Bytes, FrameError> {
    let body = codec.serialize(payload).map_err(FrameError::Serialize)?;
    let mut frame = BytesMut::with_capacity(body.len() + 1);
    frame.put_u8(kind.discriminator());
    frame.extend_from_slice(&body);
    Ok(frame.freeze())
}

pub fn encode_request(codec: &dyn PayloadCodec, request: &Request) -> Result<Bytes, FrameError> {
    let payload = serde_json::to_value(request)?;
    encode(codec, MessageKind::Request, &payload)
}

pub fn encode_response(codec: &dyn PayloadCodec, response: &Response) -> Result<Bytes, FrameError> {
    let payload = serde_json::to_value(response)?;
    encode(codec, MessageKind::Response, &payload)
}

/// Strip and validate the discriminator, then deserialize the payload.
pub fn decode(codec: &dyn PayloadCodec, frame: &[u8]) -> Result<RawFrame, FrameError> {
    let (&discriminator, body) = frame.split_first().ok_or(FrameError::Empty)?;
    let kind = MessageKind::from_discriminator(discriminator)
        .ok_or(FrameError::UnknownKind(discriminator))?;
    let payload = codec.deserialize(body).map_err(FrameError::Malformed)?;
    Ok(RawFrame { kind, payload })
}

/// A fully typed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request(Request),
    Response(Response),
}

impl Frame {
    pub fn encode(&self, codec: &dyn PayloadCodec) -> Result<Bytes, FrameError> {
        match self {
            Frame::Request(request) => encode_request(codec, request),
            Frame::Response(response) => encode_response(codec, response),
        }
    }

    pub fn decode(codec: &dyn PayloadCodec, frame: &[u8]) -> Result<Self, FrameError> {
        let raw = decode(codec, frame)?;
        Ok(match raw.kind {
            MessageKind::Request => Frame::Request(serde_json::from_value(raw.payload)?),
            MessageKind::Response => Frame::Response(serde_json::from_value(raw.payload)?),
        })
    }
}
