//! The value container and its locking protocol.
use core::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::layout::{FrameHeader, Layout, FRAME_HEADER_LEN};
use crate::{Bincode, Codec, CodecError, Error, Options, Region, Result, SpinLock, Visibility};

/// A single value persisted in a memory-mapped file.
///
/// Every handle mapping the same file, in this process or another, excludes the others through
/// the lock word in the file header. Calls on one handle are additionally serialized by the
/// handle itself, so a handle can be shared between threads.
///
/// [`get`](Self::get) and [`put`](Self::put) only hold the lock while copying bytes and run the
/// codec outside of it. [`get_and_put`](Self::get_and_put) holds the lock across decode,
/// transform and encode, which is what makes the read-modify-write atomic.
///
/// A crash while a write is copied leaves a partially overwritten payload. There is no journal.
pub struct ShmValue<T, C = Bincode> {
    pub(crate) region: Region,
    layout: Layout,
    options: Options,
    codec: C,
    path: Option<PathBuf>,
    /// Staging bytes for encoding and decoding. The mutex serializes callers of this handle.
    pub(crate) staging: Mutex<Vec<u8>>,
    value: PhantomData<fn() -> T>,
}

impl<T> ShmValue<T>
where
    Bincode: Codec<T>,
{
    /// Open the value at `path`, with ordered lock visibility and the default codec.
    ///
    /// If the file is empty or no value decodes from it, the value produced by `default` is
    /// stored.
    pub fn open(
        path: impl AsRef<Path>,
        max_value_size: usize,
        default: impl FnOnce() -> T,
    ) -> Result<Self> {
        Options::new(max_value_size).open(path, default)
    }
}

impl<T, C: Codec<T>> ShmValue<T, C> {
    /// Load the stored value, or store the default, under one acquisition of the lock.
    pub(crate) fn initialize(
        region: Region,
        layout: Layout,
        options: Options,
        codec: C,
        path: Option<PathBuf>,
        default: impl FnOnce() -> T,
    ) -> Result<Self> {
        let this = ShmValue {
            region,
            layout,
            options,
            codec,
            path,
            staging: Mutex::new(Vec::with_capacity(layout.max_value_size())),
            value: PhantomData,
        };

        if this.load_or_store(default)? {
            this.region.flush_async()?;
        }

        Ok(this)
    }

    /// Decode the stored value, storing `default` instead if that fails. Returns whether the
    /// default was stored.
    fn load_or_store(&self, default: impl FnOnce() -> T) -> Result<bool> {
        let mut staging = self.staging.lock();
        let _locked = self.lock().acquire();

        let stored = self
            .copy_out(&mut staging)
            .and_then(|()| self.codec.decode(&staging));

        let Err(err) = stored else {
            return Ok(false);
        };

        if self.region.was_created() {
            debug!("initializing fresh backing file with the default value");
        } else {
            warn!(error = %err, "replacing undecodable stored value with the default value");
        }

        let value = default();
        self.encode(&value, &mut staging)?;
        self.copy_in(&staging)?;

        Ok(true)
    }

    /// Retrieve the current value.
    pub fn get(&self) -> Result<T> {
        let mut staging = self.staging.lock();

        let copied = {
            let _locked = self.lock().acquire();
            self.copy_out(&mut staging)
        };

        copied.map_err(Error::Decode)?;
        self.codec.decode(&staging).map_err(Error::Decode)
    }

    /// Replace the current value.
    ///
    /// Fails with [`Error::CapacityExceeded`] before taking the lock if the encoding is too
    /// large, leaving the stored value unchanged.
    pub fn put(&self, value: &T) -> Result<()> {
        let mut staging = self.staging.lock();
        self.encode(value, &mut staging)?;

        let _locked = self.lock().acquire();
        self.copy_in(&staging)
    }

    /// Atomically replace the current value with `transform` of it, returning the new value.
    ///
    /// No other party can read or write the value between the read and the write. `transform`
    /// runs while the lock is held. It must not call back into this handle, which deadlocks, nor
    /// into another handle of the same file, which spins forever.
    pub fn get_and_put(&self, transform: impl FnOnce(T) -> T) -> Result<T> {
        let mut staging = self.staging.lock();
        let _locked = self.lock().acquire();

        self.copy_out(&mut staging).map_err(Error::Decode)?;
        let current = self.codec.decode(&staging).map_err(Error::Decode)?;
        let next = transform(current);

        self.encode(&next, &mut staging)?;
        self.copy_in(&staging)?;

        Ok(next)
    }
}

impl<T, C> ShmValue<T, C> {
    /// Write the mapped bytes back to the file.
    pub fn flush(&self) -> Result<()> {
        self.region.flush()
    }

    /// Flush and unmap the file.
    ///
    /// Dropping a handle unmaps as well, without flushing.
    pub fn close(self) -> Result<()> {
        self.region.flush()?;
        debug!(path = ?self.path, "closing backing file");
        Ok(())
    }

    /// The path this handle was opened from, `None` when opened from a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn max_value_size(&self) -> usize {
        self.layout.max_value_size()
    }

    /// The memory ordering this handle uses for the lock word.
    pub fn visibility(&self) -> Visibility {
        self.options.visibility
    }

    pub(crate) fn lock(&self) -> SpinLock<'_> {
        SpinLock::new(
            self.region.lock_word(),
            self.options.visibility,
            self.options.backoff,
        )
    }

    /// Copy the bytes of the stored value into `staging`. The lock must be held.
    fn copy_out(&self, staging: &mut Vec<u8>) -> Result<(), CodecError> {
        let mut header = [0; FRAME_HEADER_LEN];
        self.region
            .read_at(0, &mut header)
            .map_err(|err| CodecError::Malformed(err.to_string()))?;
        let header = FrameHeader::parse(header, &self.layout)?;

        staging.clear();
        staging.resize(header.len as usize, 0);
        self.region
            .read_at(FRAME_HEADER_LEN, staging)
            .map_err(|err| CodecError::Malformed(err.to_string()))
    }

    /// Copy an encoded value into the payload. The lock must be held.
    fn copy_in(&self, encoded: &[u8]) -> Result<()> {
        let exceeded = || Error::CapacityExceeded {
            size: encoded.len(),
            limit: self.layout.max_value_size(),
        };

        let len = u32::try_from(encoded.len()).map_err(|_| exceeded())?;
        let header = FrameHeader { len };

        self.region
            .write_at(FRAME_HEADER_LEN, encoded)
            .and_then(|()| self.region.write_at(0, &header.to_bytes()))
            .map_err(|_| exceeded())
    }

    fn encode(&self, value: &T, staging: &mut Vec<u8>) -> Result<()>
    where
        C: Codec<T>,
    {
        let limit = self.layout.max_value_size();
        staging.clear();

        let size = match self.codec.encode(value, staging, limit) {
            Ok(()) if staging.len() <= limit => return Ok(()),
            // A codec that ignored the limit.
            Ok(()) => staging.len(),
            Err(CodecError::TooLarge { size, .. }) => size,
            Err(err) => return Err(Error::Encode(err)),
        };

        // Do not keep an oversized allocation alive for the rest of the handle.
        staging.clear();
        staging.shrink_to(limit);

        Err(Error::CapacityExceeded { size, limit })
    }
}

impl<T, C> core::fmt::Debug for ShmValue<T, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShmValue")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
