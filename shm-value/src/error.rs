use crate::CodecError;

/// Errors of a [`ShmValue`](crate::ShmValue).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing file could not be created, opened, sized or mapped.
    #[error("i/o failure on the backing file")]
    Io(#[from] std::io::Error),
    /// The encoded value does not fit the configured maximum. Nothing was written.
    #[error("encoded value of {size} bytes exceeds the maximum of {limit} bytes")]
    CapacityExceeded { size: usize, limit: usize },
    /// The stored bytes do not decode.
    ///
    /// Only while opening is this taken to mean that no value has been stored yet.
    #[error("stored value does not decode")]
    Decode(#[source] CodecError),
    /// The codec rejected the value for reasons other than its size.
    #[error("value does not encode")]
    Encode(#[source] CodecError),
    /// The file exists with a length another maximum value size produced.
    #[error("backing file has {found} bytes, this configuration requires {expected}")]
    LayoutMismatch { expected: u64, found: u64 },
    /// The maximum value size is zero or can not be represented in the layout.
    #[error("maximum value size can not be represented in the file layout")]
    InvalidLayout,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
