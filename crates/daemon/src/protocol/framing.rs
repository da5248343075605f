//! Multipart framing codec.
//!
//! A message is a sequence of byte parts. On the wire each message is a
//! one-byte part count followed by each part as a big-endian u32 length
//! prefix and the part bytes. Request/reply messages carry three parts
//! (`[address][empty][json]`), published updates carry two
//! (`[topic][json]`). The decoder enforces a maximum part size so a bad
//! peer cannot make the daemon buffer unbounded input.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Largest allowed part, in bytes.
pub const DEFAULT_MAX_PART_BYTES: usize = 16 * 1024 * 1024;

/// A decoded multipart message.
pub type Multipart = Vec<Bytes>;

/// Error type for framing operations
#[derive(Debug, Error)]
pub enum FramingError {
    /// A part exceeded the configured size limit
    #[error("frame part of {size} bytes exceeds limit of {limit}")]
    PartTooLarge { size: usize, limit: usize },

    /// A message carried more parts than a u8 count can express
    #[error("message has too many parts: {0}")]
    TooManyParts(usize),

    /// IO error on the underlying transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec for multipart messages.
#[derive(Debug, Clone)]
pub struct MultipartCodec {
    max_part_bytes: usize,
}

impl MultipartCodec {
    pub fn new(max_part_bytes: usize) -> Self {
        Self { max_part_bytes }
    }
}

impl Default for MultipartCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PART_BYTES)
    }
}

impl Decoder for MultipartCodec {
    type Item = Multipart;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Multipart>, FramingError> {
        if src.is_empty() {
            return Ok(None);
        }

        // Walk the buffer without consuming to see if the whole message
        // has arrived yet.
        let part_count = src[0] as usize;
        let mut offset = 1;
        for _ in 0..part_count {
            if src.len() < offset + 4 {
                return Ok(None);
            }
            let len = u32::from_be_bytes([
                src[offset],
                src[offset + 1],
                src[offset + 2],
                src[offset + 3],
            ]) as usize;
            if len > self.max_part_bytes {
                return Err(FramingError::PartTooLarge {
                    size: len,
                    limit: self.max_part_bytes,
                });
            }
            offset += 4;
            if src.len() < offset + len {
                return Ok(None);
            }
            offset += len;
        }

        src.advance(1);
        let mut parts = Vec::with_capacity(part_count);
        for _ in 0..part_count {
            let len = src.get_u32() as usize;
            parts.push(src.split_to(len).freeze());
        }

        Ok(Some(parts))
    }
}

impl Encoder<Multipart> for MultipartCodec {
    type Error = FramingError;

    fn encode(&mut self, parts: Multipart, dst: &mut BytesMut) -> Result<(), FramingError> {
        if parts.len() > u8::MAX as usize {
            return Err(FramingError::TooManyParts(parts.len()));
        }
        for part in &parts {
            if part.len() > self.max_part_bytes {
                return Err(FramingError::PartTooLarge {
                    size: part.len(),
                    limit: self.max_part_bytes,
                });
            }
        }

        let total: usize = parts.iter().map(|p| p.len() + 4).sum::<usize>() + 1;
        dst.reserve(total);

        dst.put_u8(parts.len() as u8);
        for part in parts {
            dst.put_u32(part.len() as u32);
            dst.put(part);
        }

        Ok(())
    }
}
