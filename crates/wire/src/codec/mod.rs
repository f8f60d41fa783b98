//! Wire codecs.
//!
//! Two payload formats share one contract: turn a [`Request`] into bytes, and
//! turn one complete incoming payload into a [`Frame`]. [`WireCodec`] selects
//! between them once, when a connection is built.
//!
//! Byte-stream framing is handled separately by [`LengthPrefixedCodec`],
//! which the stream transport applies before a payload reaches this layer.

mod jsonrpc;
mod length_prefixed;
mod variant;

pub use jsonrpc::{JsonRpcCodec, PROTOCOL_TAG};
pub use length_prefixed::{DEFAULT_MAX_FRAME_SIZE, LengthPrefixedCodec, PREFIX_LEN};
pub use variant::{
    ERROR_MESSAGE, REQUEST_MESSAGE, RESPONSE_MESSAGE, VariantCodec, decode_value, encode_value,
};

use bytes::Bytes;

use crate::error::CodecError;
use crate::frame::{Frame, Request};

/// The payload format spoken on a connection.
#[derive(Debug, Clone, Copy)]
pub enum WireCodec {
    /// Textual JSON-RPC style messages.
    JsonRpc(JsonRpcCodec),
    /// Godot Variant-encoded debugger messages.
    Variant(VariantCodec),
}

impl WireCodec {
    /// Codec for the textual protocol.
    pub fn json_rpc() -> Self {
        WireCodec::JsonRpc(JsonRpcCodec::new())
    }

    /// Codec for the binary debugger protocol.
    pub fn variant() -> Self {
        WireCodec::Variant(VariantCodec::new())
    }

    /// Encode an outgoing request.
    pub fn encode_request(&self, request: &Request) -> Result<Bytes, CodecError> {
        match self {
            WireCodec::JsonRpc(codec) => codec.encode_request(request),
            WireCodec::Variant(codec) => codec.encode_request(request),
        }
    }

    /// Decode one complete incoming payload.
    pub fn decode(&self, payload: &[u8]) -> Result<Frame, CodecError> {
        match self {
            WireCodec::JsonRpc(codec) => codec.decode(payload),
            WireCodec::Variant(codec) => codec.decode(payload),
        }
    }

    /// Encode a frame as the remote side would send it.
    pub fn encode_frame(&self, frame: &Frame) -> Result<Bytes, CodecError> {
        match self {
            WireCodec::JsonRpc(codec) => codec.encode_frame(frame),
            WireCodec::Variant(codec) => codec.encode_frame(frame),
        }
    }

    /// Decode a request as the remote side would receive it.
    pub fn decode_request(&self, payload: &[u8]) -> Result<Request, CodecError> {
        match self {
            WireCodec::JsonRpc(codec) => codec.decode_request(payload),
            WireCodec::Variant(codec) => codec.decode_request(payload),
        }
    }
}
