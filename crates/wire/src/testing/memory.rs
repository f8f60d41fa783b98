//! In-memory transports for testing.

use tokio::io::{DuplexStream, duplex};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

use crate::transport::StreamTransport;
use crate::websocket::WebSocketTransport;

/// A length-prefixed transport over an in-memory duplex pipe.
///
/// # Example
///
/// ```
/// use wire::testing::MemoryTransport;
/// use wire::Transport;
///
/// // Create a connected pair of transports
/// let (client, server) = MemoryTransport::pair();
///
/// // Payloads written to the client sink arrive on the server stream
/// let (client_sink, client_stream) = client.into_split();
/// let (server_sink, server_stream) = server.into_split();
/// ```
pub type MemoryTransport = StreamTransport<DuplexStream>;

impl MemoryTransport {
    /// Create a connected pair of in-memory transports.
    ///
    /// Uses a default buffer size of 64KB for each direction.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_buffer_size(64 * 1024)
    }

    /// Create a connected pair with a custom buffer size.
    ///
    /// Smaller buffers force payloads to arrive in several reads.
    pub fn pair_with_buffer_size(buffer_size: usize) -> (Self, Self) {
        let (a, b) = duplex(buffer_size);
        (StreamTransport::new(a), StreamTransport::new(b))
    }
}

/// Create a connected pair of WebSocket transports over an in-memory pipe.
///
/// Returns `(client, server)`. The handshake is skipped; both ends speak
/// WebSocket framing from the first byte.
pub async fn websocket_pair() -> (
    WebSocketTransport<DuplexStream>,
    WebSocketTransport<DuplexStream>,
) {
    let (client_stream, server_stream) = duplex(64 * 1024);

    let (client, server) = tokio::join!(
        WebSocketStream::from_raw_socket(client_stream, Role::Client, None),
        WebSocketStream::from_raw_socket(server_stream, Role::Server, None),
    );

    (WebSocketTransport::new(client), WebSocketTransport::new(server))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transport;
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};

    #[tokio::test]
    async fn memory_transport_roundtrip() {
        let (client, server) = MemoryTransport::pair();

        let (mut client_sink, mut client_stream) = client.into_split();
        let (mut server_sink, mut server_stream) = server.into_split();

        client_sink.send(Bytes::from_static(b"request")).await.unwrap();
        assert_eq!(&server_stream.next().await.unwrap().unwrap()[..], b"request");

        server_sink.send(Bytes::from_static(b"reply")).await.unwrap();
        assert_eq!(&client_stream.next().await.unwrap().unwrap()[..], b"reply");
    }

    #[tokio::test]
    async fn small_buffer_still_delivers_whole_frames() {
        let (client, server) = MemoryTransport::pair_with_buffer_size(5);

        let (mut client_sink, _client_stream) = client.into_split();
        let (_server_sink, mut server_stream) = server.into_split();

        let payload = Bytes::from(vec![7u8; 100]);
        let sent = payload.clone();
        let writer = tokio::spawn(async move { client_sink.send(sent).await });

        assert_eq!(server_stream.next().await.unwrap().unwrap(), payload);
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn memory_transport_close_signals_eof() {
        let (client, server) = MemoryTransport::pair();

        let (client_sink, client_stream) = client.into_split();
        let (_server_sink, mut server_stream) = server.into_split();

        drop(client_sink);
        drop(client_stream);

        assert!(server_stream.next().await.is_none());
    }
}
