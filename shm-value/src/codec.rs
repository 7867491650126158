//! Converts between values and the bytes stored in the payload.
//!
//! The container frames and bounds the bytes; a codec only sees the exact bytes of one value.
use serde::{de::DeserializeOwned, Serialize};

/// Encoding and decoding of one value type.
pub trait Codec<T> {
    /// Append the encoding of `value` to `into`, at most `limit` bytes.
    ///
    /// Fails with [`CodecError::TooLarge`] as soon as the encoding would exceed `limit`, without
    /// growing `into` past it.
    fn encode(&self, value: &T, into: &mut Vec<u8>, limit: usize) -> Result<(), CodecError>;

    /// Decode a value from exactly the bytes of one prior `encode`.
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Truncated, corrupt or incompatible bytes.
    #[error("malformed value: {0}")]
    Malformed(String),
    /// The value can not be represented by the codec.
    #[error("unsupported value: {0}")]
    Unsupported(String),
    /// The encoding reached `size` bytes, more than the limit it was given.
    ///
    /// Encoding stops at the first write past the limit, so `size` is a lower bound.
    #[error("encoding reached {size} bytes, more than the limit of {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Any serde value, as `bincode` with fixed-width little-endian integers.
///
/// Fixed-width integers keep the encoded size of a value independent of its magnitude, so that a
/// `u32` always takes four bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bincode;

/// Plain-old-data values as their raw bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pod;

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Appends to a buffer but refuses any write that would take it past `limit`.
struct BoundedWriter<'lt> {
    buf: &'lt mut Vec<u8>,
    limit: usize,
    /// Length the buffer would have had with the refused write.
    reached: &'lt mut usize,
}

impl bincode::enc::write::Writer for BoundedWriter<'_> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), bincode::error::EncodeError> {
        *self.reached = self.buf.len().saturating_add(bytes.len());

        if *self.reached > self.limit {
            return Err(bincode::error::EncodeError::UnexpectedEnd);
        }

        self.buf.extend_from_slice(bytes);
        Ok(())
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> for Bincode {
    fn encode(&self, value: &T, into: &mut Vec<u8>, limit: usize) -> Result<(), CodecError> {
        let start = into.len();
        let mut reached = start;
        let writer = BoundedWriter {
            buf: into,
            limit: start.saturating_add(limit),
            reached: &mut reached,
        };

        match bincode::serde::encode_into_writer(value, writer, bincode_config()) {
            Ok(()) => Ok(()),
            Err(_) if reached - start > limit => Err(CodecError::TooLarge {
                size: reached - start,
                limit,
            }),
            Err(err) => Err(CodecError::Unsupported(err.to_string())),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let (value, read) = bincode::serde::decode_from_slice(bytes, bincode_config())
            .map_err(|err| CodecError::Malformed(err.to_string()))?;

        if read != bytes.len() {
            return Err(CodecError::Malformed(format!(
                "{} trailing bytes after value",
                bytes.len() - read
            )));
        }

        Ok(value)
    }
}

impl<T: bytemuck::Pod> Codec<T> for Pod {
    fn encode(&self, value: &T, into: &mut Vec<u8>, limit: usize) -> Result<(), CodecError> {
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() > limit {
            return Err(CodecError::TooLarge {
                size: bytes.len(),
                limit,
            });
        }

        into.extend_from_slice(bytes);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        bytemuck::try_pod_read_unaligned(bytes)
            .map_err(|err| CodecError::Malformed(format!("{err:?} for {} bytes", bytes.len())))
    }
}
