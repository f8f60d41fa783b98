//! Length-prefixed frame reader.
//!
//! This module provides [`FrameReader`], a wrapper around a framed async
//! reader that produces a stream of complete frame payloads.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::LengthPrefixedCodec;
use crate::error::CodecError;

pin_project! {
    /// An async stream of incoming frame payloads.
    ///
    /// Partial reads are buffered until a whole frame has arrived, and a
    /// single read holding several frames yields each of them in order.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use futures::StreamExt;
    /// use wire::FrameReader;
    ///
    /// let mut reader = FrameReader::new(tcp_read_half);
    /// while let Some(payload) = reader.next().await {
    ///     let payload = payload?;
    /// }
    /// ```
    pub struct FrameReader<R> {
        #[pin]
        inner: FramedRead<R, LengthPrefixedCodec>,
    }
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Create a new reader from an async read source.
    pub fn new(reader: R) -> Self {
        Self {
            inner: FramedRead::new(reader, LengthPrefixedCodec::new()),
        }
    }

    /// Create a new reader with a custom codec.
    pub fn with_codec(reader: R, codec: LengthPrefixedCodec) -> Self {
        Self {
            inner: FramedRead::new(reader, codec),
        }
    }

    /// Consume the reader and return the underlying source.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R> Stream for FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    type Item = Result<Bytes, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}
