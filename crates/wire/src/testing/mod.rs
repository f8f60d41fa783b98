//! Testing utilities for the wire layer.
//!
//! This module provides in-memory transports for both transport flavours
//! and helpers for building raw length-prefixed byte streams.

mod memory;

pub use memory::{MemoryTransport, websocket_pair};

/// Prefix `payload` with its little-endian length, as it appears on a byte
/// stream.
///
/// # Example
///
/// ```
/// use wire::testing::frame_payload;
///
/// assert_eq!(frame_payload(b"ab"), vec![2, 0, 0, 0, b'a', b'b']);
/// ```
pub fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let mut frame = (payload.len() as u32).to_le_bytes().to_vec();
    frame.extend_from_slice(payload);
    frame
}

/// Concatenate several length-prefixed frames into one buffer.
pub fn frame_payloads<T: AsRef<[u8]>>(payloads: &[T]) -> Vec<u8> {
    payloads
        .iter()
        .flat_map(|p| frame_payload(p.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_payloads() {
        let bytes = frame_payloads(&[&b"a"[..], &b"bc"[..]]);
        assert_eq!(bytes, vec![1, 0, 0, 0, b'a', 2, 0, 0, 0, b'b', b'c']);
    }
}
