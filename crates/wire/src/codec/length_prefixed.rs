//! Length-prefix framing for byte-stream transports.
//!
//! Every frame is a 4-byte little-endian length followed by that many bytes
//! of payload:
//! ```text
//! <u32 LE length><payload>
//! ```
//! This codec only delimits frames. What the payload means is up to the
//! payload codec layered on top of it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Width of the length prefix in bytes.
pub const PREFIX_LEN: usize = 4;

/// Default maximum frame size (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Codec that splits a byte stream into length-prefixed frames.
///
/// # Example
///
/// ```ignore
/// use tokio_util::codec::FramedRead;
/// use wire::LengthPrefixedCodec;
///
/// let framed = FramedRead::new(reader, LengthPrefixedCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct LengthPrefixedCodec {
    /// Maximum allowed payload size in bytes.
    max_frame_size: usize,
}

impl LengthPrefixedCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a new codec with a custom maximum frame size.
    ///
    /// A prefix announcing more than this is rejected with
    /// [`CodecError::FrameTooLarge`] instead of being buffered.
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// The configured maximum frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for LengthPrefixedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LengthPrefixedCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&src[..PREFIX_LEN]);
        let frame_len = u32::from_le_bytes(prefix) as usize;

        if frame_len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: frame_len,
                max: self.max_frame_size,
            });
        }

        let total_len = PREFIX_LEN + frame_len;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        src.advance(PREFIX_LEN);
        Ok(Some(src.split_to(frame_len).freeze()))
    }
}

impl Encoder<Bytes> for LengthPrefixedCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: item.len(),
                max: self.max_frame_size,
            });
        }

        dst.reserve(PREFIX_LEN + item.len());
        dst.put_u32_le(item.len() as u32);
        dst.put_slice(&item);
        Ok(())
    }
}
