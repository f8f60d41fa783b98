//! Transport abstraction and the byte-stream transport.
//!
//! A transport owns one duplex connection. Splitting it yields a
//! [`FrameSink`] that writes one complete payload per item, and a
//! [`FrameStream`] that lazily yields complete incoming payloads and ends
//! when the connection closes.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, TryStreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::codec::LengthPrefixedCodec;
use crate::error::TransportError;
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// Writing half of a transport: one item is one frame.
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = TransportError> + Send>>;

/// Reading half of a transport: complete incoming frame payloads.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// A connection that can be split into a frame sink and a frame stream.
///
/// Implemented by the message-oriented [`WebSocketTransport`] and the
/// length-prefixed [`StreamTransport`].
///
/// [`WebSocketTransport`]: crate::WebSocketTransport
pub trait Transport: Send + 'static {
    /// Split the transport into its writing and reading halves.
    ///
    /// Dropping both halves closes the connection.
    fn into_split(self) -> (FrameSink, FrameStream);
}

/// A byte-stream transport with explicit length-prefix framing.
///
/// # Example
///
/// ```ignore
/// use wire::{StreamTransport, Transport};
///
/// let transport = StreamTransport::connect("127.0.0.1:6007", timeout).await?;
/// let (sink, stream) = transport.into_split();
/// ```
pub struct StreamTransport<S> {
    stream: S,
    codec: LengthPrefixedCodec,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an established byte stream.
    pub fn new(stream: S) -> Self {
        Self::with_codec(stream, LengthPrefixedCodec::new())
    }

    /// Wrap an established byte stream with a custom framing codec.
    pub fn with_codec(stream: S, codec: LengthPrefixedCodec) -> Self {
        Self { stream, codec }
    }

    /// Reject incoming frames larger than `max_frame_size`.
    pub fn with_max_frame_size(self, max_frame_size: usize) -> Self {
        Self {
            codec: LengthPrefixedCodec::with_max_size(max_frame_size),
            ..self
        }
    }
}

impl StreamTransport<TcpStream> {
    /// Connect to a remote process listening on `addr`.
    pub async fn connect(
        addr: impl ToSocketAddrs + std::fmt::Display,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let target = addr.to_string();
        tracing::debug!(%target, "connecting byte-stream transport");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                target: target.clone(),
                timeout,
            })?
            .map_err(|e| TransportError::ConnectFailed {
                target,
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;

        Ok(Self::new(stream))
    }

    /// Wait for the remote process to connect to `listener`.
    pub async fn accept(listener: &TcpListener, timeout: Duration) -> Result<Self, TransportError> {
        let target = listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<listener>".to_string());
        tracing::debug!(%target, "waiting for remote to connect");

        let (stream, peer) = tokio::time::timeout(timeout, listener.accept())
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                target: target.clone(),
                timeout,
            })?
            .map_err(|e| TransportError::ConnectFailed {
                target,
                reason: e.to_string(),
            })?;
        tracing::debug!(%peer, "remote connected");
        stream.set_nodelay(true)?;

        Ok(Self::new(stream))
    }

    /// Bind `addr` and wait for a single remote connection.
    pub async fn listen(
        addr: impl ToSocketAddrs + std::fmt::Display,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let target = addr.to_string();
        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|e| TransportError::ConnectFailed {
                    target,
                    reason: e.to_string(),
                })?;
        Self::accept(&listener, timeout).await
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn into_split(self) -> (FrameSink, FrameStream) {
        let (read, write) = tokio::io::split(self.stream);
        let reader = FrameReader::with_codec(read, self.codec.clone()).map_err(TransportError::from);
        let writer = FrameWriter::with_codec(write, self.codec).sink_map_err(TransportError::from);
        (Box::pin(writer), Box::pin(reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn tcp_transport_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (server, client) = tokio::join!(
            StreamTransport::accept(&listener, Duration::from_secs(5)),
            StreamTransport::connect(addr, Duration::from_secs(5)),
        );
        let (_server_sink, mut server_stream) = server.unwrap().into_split();
        let (mut client_sink, _client_stream) = client.unwrap().into_split();

        client_sink.send(Bytes::from_static(b"ping")).await.unwrap();
        let payload = server_stream.next().await.unwrap().unwrap();
        assert_eq!(&payload[..], b"ping");
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = StreamTransport::connect(addr, Duration::from_secs(5)).await;
        assert!(result.err().is_some_and(|e| e.is_connect_failure()));
    }

    #[tokio::test]
    async fn max_frame_size_applies_to_incoming_frames() {
        let (client, server) = tokio::io::duplex(1024);
        let (mut sink, _) = StreamTransport::new(client).into_split();
        let (_, mut stream) = StreamTransport::new(server)
            .with_max_frame_size(4)
            .into_split();

        sink.send(Bytes::from_static(b"too long")).await.unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            TransportError::Codec(crate::CodecError::FrameTooLarge { size: 8, max: 4 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn accept_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let result = StreamTransport::accept(&listener, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(TransportError::ConnectTimeout { .. })));
    }
}
