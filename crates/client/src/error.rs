//! Error types returned to callers of the client.

use std::time::Duration;

use wire::{CodecError, TransportError};

/// Errors a call on the [`Client`](crate::Client) can fail with.
///
/// Each call observes exactly one of these; races inside the client (a
/// response arriving just as a timeout fires) are settled before they reach
/// the caller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport could not be established within the connect timeout.
    #[error("failed to connect to {target}: {reason}")]
    ConnectFailed {
        /// Where we tried to connect.
        target: String,
        /// Why it failed.
        reason: String,
    },

    /// A call was made while no connection is established.
    #[error("not connected to Godot")]
    NotConnected,

    /// The connection closed while the call was pending, or before it started.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// What closed the connection.
        reason: String,
    },

    /// The remote side sent bytes that could not be decoded. The connection
    /// is closed as a result.
    #[error("malformed frame from remote: {0}")]
    MalformedFrame(String),

    /// A call or wait did not complete in time.
    #[error("{operation} timed out after {timeout:?}")]
    RequestTimeout {
        /// What was being waited on.
        operation: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The remote side reported a failure for this call.
    #[error("'{method}' failed on the remote side: {message}")]
    Remote {
        /// The method that failed.
        method: String,
        /// Optional numeric error code.
        code: Option<i64>,
        /// The remote error message, verbatim.
        message: String,
    },

    /// A named target does not exist (yet).
    #[error("node not found: {path}")]
    NotFound {
        /// The path that was looked up.
        path: String,
    },

    /// An outgoing request could not be encoded.
    #[error("could not encode request: {0}")]
    Encode(#[source] CodecError),

    /// The configuration could not be loaded or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether retrying the same operation later may succeed without
    /// reconnecting. Pollers treat these as "not yet".
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::NotFound { .. }
                | ClientError::Remote { .. }
                | ClientError::RequestTimeout { .. }
        )
    }

    /// Whether the connection is unusable and must be re-established.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected
                | ClientError::ConnectionClosed { .. }
                | ClientError::MalformedFrame(_)
        )
    }

    pub(crate) fn connect_failed(target: &str, error: TransportError) -> Self {
        ClientError::ConnectFailed {
            target: target.to_string(),
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let not_found = ClientError::NotFound {
            path: "/root/Main".to_string(),
        };
        assert!(not_found.is_transient());
        assert!(!not_found.is_connection_fatal());

        let closed = ClientError::ConnectionClosed {
            reason: "remote closed the connection".to_string(),
        };
        assert!(!closed.is_transient());
        assert!(closed.is_connection_fatal());

        assert!(ClientError::MalformedFrame("bad".to_string()).is_connection_fatal());
    }

    #[test]
    fn remote_error_carries_message() {
        let error = ClientError::Remote {
            method: "get_property".to_string(),
            code: None,
            message: "no such node".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "'get_property' failed on the remote side: no such node"
        );
    }
}
