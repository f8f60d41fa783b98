//! Error types for the wire layer.

use std::io;
use std::time::Duration;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A length prefix announced a frame larger than the configured bound.
    #[error("frame size {size} exceeds maximum allowed {max}")]
    FrameTooLarge {
        /// The announced frame size.
        size: usize,
        /// The maximum allowed size.
        max: usize,
    },

    /// Failed to deserialize a JSON message.
    #[error("JSON deserialization failed: {0}")]
    JsonDeserialize(#[source] serde_json::Error),

    /// Failed to serialize an outgoing JSON message.
    #[error("JSON serialization failed: {0}")]
    JsonSerialize(#[source] serde_json::Error),

    /// The message parsed but does not have the shape of any known frame.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A Variant payload ended before the value it announced.
    #[error("variant payload truncated: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Offset at which the read was attempted.
        offset: usize,
        /// Number of bytes the read required.
        needed: usize,
    },

    /// A Variant type this codec does not understand.
    #[error("unsupported variant type {0}")]
    UnsupportedVariant(u32),

    /// A JSON value that cannot be represented as a Variant.
    #[error("value cannot be encoded as a variant: {0}")]
    Unencodable(String),
}

/// Errors raised by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("failed to connect to {target}: {reason}")]
    ConnectFailed {
        /// Where we tried to connect.
        target: String,
        /// Why it failed.
        reason: String,
    },

    /// The connection was not established within the connect timeout.
    #[error("connection to {target} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Where we tried to connect.
        target: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The transport has been closed and can no longer carry frames.
    #[error("transport closed")]
    Closed,

    /// Framing failed on a byte stream.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The WebSocket layer reported an error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An I/O error occurred on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether this error occurred while establishing the connection.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectFailed { .. } | TransportError::ConnectTimeout { .. }
        )
    }
}
