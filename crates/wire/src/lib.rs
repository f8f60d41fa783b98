//! Wire layer for talking to a running Godot instance.
//!
//! This crate turns logical requests into bytes on a socket and incoming
//! bytes back into [`Frame`]s. It knows nothing about which calls are made
//! or how answers are matched to callers.
//!
//! # Architecture
//!
//! Two protocols are supported, each a pairing of a transport with a payload
//! codec:
//!
//! - **text**: [`WebSocketTransport`] + [`JsonRpcCodec`]. One WebSocket
//!   message is one JSON-RPC style frame.
//! - **binary**: [`StreamTransport`] + [`VariantCodec`]. A raw TCP stream
//!   delimited by [`LengthPrefixedCodec`], each payload a Godot Variant
//!   encoded debugger message.
//!
//! Both transports implement [`Transport`], splitting into a [`FrameSink`]
//! and a [`FrameStream`] of complete payloads. Both codecs sit behind
//! [`WireCodec`].
//!
//! # Usage
//!
//! ```ignore
//! use futures::{SinkExt, StreamExt};
//! use wire::{Request, Transport, WebSocketTransport, WireCodec};
//!
//! let transport = WebSocketTransport::connect("ws://localhost:9999", timeout).await?;
//! let codec = WireCodec::json_rpc();
//! let (mut sink, mut stream) = transport.into_split();
//!
//! sink.send(codec.encode_request(&Request::new(1, "get_tree", None))?).await?;
//! while let Some(payload) = stream.next().await {
//!     let frame = codec.decode(&payload?)?;
//! }
//! ```

mod codec;
mod error;
mod frame;
mod reader;
mod transport;
mod websocket;
mod writer;

pub mod testing;

pub use codec::{
    DEFAULT_MAX_FRAME_SIZE, ERROR_MESSAGE, JsonRpcCodec, LengthPrefixedCodec, PREFIX_LEN,
    PROTOCOL_TAG, REQUEST_MESSAGE, RESPONSE_MESSAGE, VariantCodec, WireCodec, decode_value,
    encode_value,
};
pub use error::{CodecError, TransportError};
pub use frame::{Frame, Request, RequestId};
pub use reader::FrameReader;
pub use transport::{FrameSink, FrameStream, StreamTransport, Transport};
pub use websocket::WebSocketTransport;
pub use writer::FrameWriter;
