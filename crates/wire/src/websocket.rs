//! Message-oriented WebSocket transport.
//!
//! Every WebSocket message carries exactly one payload, so no extra framing
//! is applied. Outgoing payloads are sent as text messages when they are
//! valid UTF-8 (the JSON-RPC codec always produces UTF-8) and as binary
//! messages otherwise. Control frames are consumed here and never reach the
//! codec.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt, future};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;
use crate::transport::{FrameSink, FrameStream, Transport};

/// A transport over an established WebSocket connection.
pub struct WebSocketTransport<S> {
    ws: WebSocketStream<S>,
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an established WebSocket stream.
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self { ws }
    }
}

impl WebSocketTransport<MaybeTlsStream<TcpStream>> {
    /// Open a WebSocket connection to `url` (e.g. `ws://localhost:9999`).
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, TransportError> {
        tracing::debug!(%url, "connecting websocket transport");

        let (ws, response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                target: url.to_string(),
                timeout,
            })?
            .map_err(|e| TransportError::ConnectFailed {
                target: url.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(status = %response.status(), "websocket handshake complete");

        Ok(Self::new(ws))
    }
}

impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn into_split(self) -> (FrameSink, FrameStream) {
        let (sink, stream) = self.ws.split();

        let sink = sink
            .sink_map_err(TransportError::from)
            .with(|payload: Bytes| future::ready(Ok::<_, TransportError>(to_message(payload))));
        let stream = stream.filter_map(|message| future::ready(into_payload(message)));

        (Box::pin(sink), Box::pin(stream))
    }
}

fn to_message(payload: Bytes) -> Message {
    match std::str::from_utf8(&payload) {
        Ok(text) => Message::text(text.to_owned()),
        Err(_) => Message::binary(payload),
    }
}

fn into_payload(
    message: Result<Message, tungstenite::Error>,
) -> Option<Result<Bytes, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Bytes::copy_from_slice(text.as_str().as_bytes()))),
        Ok(Message::Binary(data)) => Some(Ok(data)),
        Ok(Message::Close(frame)) => {
            tracing::debug!(?frame, "websocket closed by remote");
            None
        }
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => None,
        Err(e) => Some(Err(TransportError::from(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::websocket_pair;

    #[tokio::test]
    async fn text_payloads_roundtrip() {
        let (client, server) = websocket_pair().await;
        let (mut client_sink, mut client_stream) = client.into_split();
        let (mut server_sink, mut server_stream) = server.into_split();

        client_sink
            .send(Bytes::from_static(br#"{"id":1}"#))
            .await
            .unwrap();
        assert_eq!(&server_stream.next().await.unwrap().unwrap()[..], br#"{"id":1}"#);

        server_sink
            .send(Bytes::from_static(&[0xff, 0x00]))
            .await
            .unwrap();
        assert_eq!(&client_stream.next().await.unwrap().unwrap()[..], &[0xff, 0x00]);
    }

    #[tokio::test]
    async fn stream_ends_when_peer_closes() {
        let (client, server) = websocket_pair().await;
        let (_client_sink, mut client_stream) = client.into_split();
        let (mut server_sink, server_stream) = server.into_split();

        server_sink.close().await.unwrap();
        drop(server_sink);
        drop(server_stream);

        assert!(client_stream.next().await.is_none());
    }

    #[test]
    fn non_utf8_payloads_become_binary_messages() {
        assert!(matches!(to_message(Bytes::from_static(b"{}")), Message::Text(_)));
        assert!(matches!(
            to_message(Bytes::from_static(&[0xc3, 0x28])),
            Message::Binary(_)
        ));
    }
}
