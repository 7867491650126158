//! The fixed layout of a backing file.
//!
//! ```text
//! offset  len           field
//! 0       4             lock word, 0 = unlocked, 1 = locked
//! 4       12            reserved
//! 16      max + 128     payload: frame header, then the encoded value
//! ```
//!
//! The layout never changes after the file has been sized. All handles of one file must agree on
//! the maximum value size, see [`crate::Error::LayoutMismatch`].
use core::ops::Range;

use crate::{CodecError, Error};

pub const LOCK_OFFSET: usize = 0;
pub const RESERVED: Range<usize> = 4..16;
pub const HEADER_LEN: usize = 16;
pub const PAYLOAD_OFFSET: usize = HEADER_LEN;
/// Bytes beyond the configured value size. Holds the frame header.
pub const SLACK: usize = 128;

/// Tag at the start of every written frame. The last byte is the frame version.
pub const FRAME_MAGIC: [u8; 4] = *b"SHV\x01";
pub const FRAME_HEADER_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    max_value_size: usize,
    capacity: usize,
}

/// Precedes the encoded value inside the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub len: u32,
}

impl Layout {
    pub fn for_value_size(max_value_size: usize) -> Result<Self, Error> {
        if max_value_size == 0 {
            return Err(Error::InvalidLayout);
        }

        // The frame stores the length as a `u32`.
        u32::try_from(max_value_size).map_err(|_| Error::InvalidLayout)?;

        let capacity = HEADER_LEN
            .checked_add(max_value_size)
            .and_then(|len| len.checked_add(SLACK))
            .ok_or(Error::InvalidLayout)?;

        u64::try_from(capacity).map_err(|_| Error::InvalidLayout)?;

        Ok(Layout {
            max_value_size,
            capacity,
        })
    }

    pub fn max_value_size(&self) -> usize {
        self.max_value_size
    }

    /// Total length of the backing file.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn payload_len(&self) -> usize {
        self.capacity - HEADER_LEN
    }
}

impl FrameHeader {
    pub fn to_bytes(self) -> [u8; FRAME_HEADER_LEN] {
        let mut bytes = [0; FRAME_HEADER_LEN];
        bytes[..4].copy_from_slice(&FRAME_MAGIC);
        bytes[4..].copy_from_slice(&self.len.to_le_bytes());
        bytes
    }

    /// Validate a header read from the payload.
    ///
    /// A zero-filled payload, as found in a fresh file, fails on the tag.
    pub fn parse(bytes: [u8; FRAME_HEADER_LEN], layout: &Layout) -> Result<Self, CodecError> {
        let [a, b, c, d, l0, l1, l2, l3] = bytes;

        if [a, b, c, d] != FRAME_MAGIC {
            return Err(CodecError::Malformed("no value frame in payload".into()));
        }

        let len = u32::from_le_bytes([l0, l1, l2, l3]);
        if len as usize > layout.max_value_size() {
            return Err(CodecError::Malformed(format!(
                "frame length {len} exceeds the maximum value size {}",
                layout.max_value_size()
            )));
        }

        Ok(FrameHeader { len })
    }
}
