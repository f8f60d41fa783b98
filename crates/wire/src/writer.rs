//! Length-prefixed frame writer.
//!
//! This module provides [`FrameWriter`], a wrapper around a framed async
//! writer for sending frame payloads.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Sink;
use pin_project_lite::pin_project;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::LengthPrefixedCodec;
use crate::error::CodecError;

pin_project! {
    /// An async sink for outgoing frame payloads.
    ///
    /// Each payload is written with its length prefix.
    pub struct FrameWriter<W> {
        #[pin]
        inner: FramedWrite<W, LengthPrefixedCodec>,
    }
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Create a new writer for an async write destination.
    pub fn new(writer: W) -> Self {
        Self {
            inner: FramedWrite::new(writer, LengthPrefixedCodec::new()),
        }
    }

    /// Create a new writer with a custom codec.
    pub fn with_codec(writer: W, codec: LengthPrefixedCodec) -> Self {
        Self {
            inner: FramedWrite::new(writer, codec),
        }
    }

    /// Send one payload, flushing it to the destination.
    pub async fn send(&mut self, payload: Bytes) -> Result<(), CodecError> {
        use futures::SinkExt;
        SinkExt::send(&mut self.inner, payload).await
    }

    /// Consume the writer and return the underlying destination.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W> Sink<Bytes> for FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn write_prefixes_each_payload() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));

        writer.send(Bytes::from_static(b"ab")).await.unwrap();
        writer.send(Bytes::from_static(b"cde")).await.unwrap();

        let output = writer.into_inner().into_inner();
        assert_eq!(output, vec![2, 0, 0, 0, b'a', b'b', 3, 0, 0, 0, b'c', b'd', b'e']);
    }

    #[tokio::test]
    async fn write_rejects_oversized_payload() {
        let mut writer =
            FrameWriter::with_codec(Cursor::new(Vec::new()), LengthPrefixedCodec::with_max_size(2));

        let result = writer.send(Bytes::from_static(b"abc")).await;
        assert!(matches!(result, Err(CodecError::FrameTooLarge { .. })));
    }
}
