use std::fs::File;
use std::path::Path;

use crate::layout::Layout;
use crate::{Backoff, Bincode, Codec, Region, Result, ShmValue, Visibility};

/// Configuration of a [`ShmValue`] handle.
///
/// Every handle of one backing file must be opened with the same `max_value_size`. The
/// visibility and backoff are per handle, but mixing [`Visibility::Relaxed`] with other handles
/// forfeits any cross-handle guarantee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    pub(crate) max_value_size: usize,
    pub(crate) visibility: Visibility,
    pub(crate) backoff: Backoff,
}

impl Options {
    /// Options for values whose encoding is at most `max_value_size` bytes.
    pub fn new(max_value_size: usize) -> Self {
        Options {
            max_value_size,
            visibility: Visibility::default(),
            backoff: Backoff::default(),
        }
    }

    /// Set the memory ordering of lock transitions, [`Visibility::Ordered`] by default.
    pub fn with_visibility(self, visibility: Visibility) -> Self {
        Options { visibility, ..self }
    }

    /// Set how waiters pause while the lock is held elsewhere.
    pub fn with_backoff(self, backoff: Backoff) -> Self {
        Options { backoff, ..self }
    }

    pub fn max_value_size(&self) -> usize {
        self.max_value_size
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Open the value stored at `path` with the default codec.
    ///
    /// `default` is only called if no value decodes from the file, e.g. for a fresh file.
    pub fn open<T>(self, path: impl AsRef<Path>, default: impl FnOnce() -> T) -> Result<ShmValue<T>>
    where
        Bincode: Codec<T>,
    {
        self.open_with(path, Bincode, default)
    }

    /// Open the value stored at `path`, encoded with `codec`.
    pub fn open_with<T, C: Codec<T>>(
        self,
        path: impl AsRef<Path>,
        codec: C,
        default: impl FnOnce() -> T,
    ) -> Result<ShmValue<T, C>> {
        let path = path.as_ref();
        let layout = Layout::for_value_size(self.max_value_size)?;
        let region = Region::open(path, &layout)?;
        ShmValue::initialize(region, layout, self, codec, Some(path.to_owned()), default)
    }

    /// Open the value stored in an already opened file, encoded with `codec`.
    ///
    /// The file must be readable and writable.
    pub fn from_file<T, C: Codec<T>>(
        self,
        file: &File,
        codec: C,
        default: impl FnOnce() -> T,
    ) -> Result<ShmValue<T, C>> {
        let layout = Layout::for_value_size(self.max_value_size)?;
        let region = Region::from_file(file, &layout)?;
        ShmValue::initialize(region, layout, self, codec, None, default)
    }
}
