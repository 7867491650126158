//! Owns the mapping of a backing file.
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapRaw;
use tracing::debug;

use crate::layout::{Layout, HEADER_LEN, LOCK_OFFSET, PAYLOAD_OFFSET};
use crate::Error;

/// A backing file mapped read-write and shared with every other mapping of it.
///
/// The region is a fixed arena: the lock word at [`LOCK_OFFSET`], the payload from
/// [`PAYLOAD_OFFSET`] to the end. Payload bytes are only reachable through bounds-checked ranges.
pub struct Region {
    /// The memory map protecting the validity of all references we hand out. Unmapped on drop.
    map: MmapRaw,
    /// Whether this open gave the file its length.
    created: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("range at {offset} of {len} bytes is outside the payload of {payload} bytes")]
pub struct OutOfBounds {
    pub offset: usize,
    pub len: usize,
    pub payload: usize,
}

impl Region {
    /// Open, creating if necessary, the file at `path` and map it.
    pub fn open(path: &Path, layout: &Layout) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let region = Self::from_file(&file, layout)?;
        debug!(
            path = %path.display(),
            capacity = layout.capacity(),
            created = region.created,
            "mapped backing file"
        );

        Ok(region)
    }

    /// Map an already opened file.
    ///
    /// An empty file is extended to the capacity of `layout`. Any other length than exactly the
    /// capacity is rejected, the file was set up for a different maximum value size.
    ///
    /// The length check and the extension of an empty file are not atomic. Openers that race on
    /// an empty file with different layouts can each pass the check, and the last `set_len` wins.
    /// The length is checked again after mapping, which catches most such races, but using one
    /// layout for every opener of a file remains the caller's responsibility. A file shrunk below
    /// the mapping by another opener faults on access.
    pub fn from_file(file: &File, layout: &Layout) -> Result<Self, Error> {
        let expected = layout.capacity() as u64;
        let found = file.metadata()?.len();

        let created = if found == 0 {
            file.set_len(expected)?;
            true
        } else if found != expected {
            return Err(Error::LayoutMismatch { expected, found });
        } else {
            false
        };

        let map = MmapRaw::map_raw(file)?;

        // Someone resized the file between our check and the map.
        let resized = file.metadata()?.len();
        if map.len() != layout.capacity() || resized != expected {
            return Err(Error::LayoutMismatch {
                expected,
                found: resized,
            });
        }

        Ok(Region { map, created })
    }

    /// The lock word, shared with every other mapping of the file.
    pub fn lock_word(&self) -> &AtomicU32 {
        // Safety: the map is page aligned and at least `HEADER_LEN` long, so `LOCK_OFFSET` holds
        // an aligned `u32` for as long as `self` keeps the map. Atomics have no uniqueness
        // requirement; other mappings of the same file access the word concurrently.
        unsafe { &*(self.map.as_mut_ptr().add(LOCK_OFFSET) as *const AtomicU32) }
    }

    /// All payload bytes, following the header.
    pub fn payload(&self) -> &[AtomicU8] {
        let len = self.map.len() - HEADER_LEN;
        // Safety: in-bounds of the map, see `from_file`. Byte atomics are always aligned and the
        // memory of a file mapping is initialized (zero-filled past the end of written data).
        unsafe {
            core::slice::from_raw_parts(
                self.map.as_mut_ptr().add(PAYLOAD_OFFSET) as *const AtomicU8,
                len,
            )
        }
    }

    /// Copy payload bytes starting at `offset` into `into`.
    ///
    /// Copies are not atomic as a whole. Callers hold the lock to get a consistent snapshot.
    pub fn read_at(&self, offset: usize, into: &mut [u8]) -> Result<(), OutOfBounds> {
        let src = self.range(offset, into.len())?;

        for (byte, cell) in into.iter_mut().zip(src) {
            *byte = cell.load(Ordering::Relaxed);
        }

        Ok(())
    }

    /// Copy `data` into the payload starting at `offset`.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<(), OutOfBounds> {
        let dst = self.range(offset, data.len())?;

        for (&byte, cell) in data.iter().zip(dst) {
            cell.store(byte, Ordering::Relaxed);
        }

        Ok(())
    }

    /// Total length of the mapping.
    pub fn capacity(&self) -> usize {
        self.map.len()
    }

    /// Whether opening this region gave a previously empty file its length.
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Write the mapped bytes back to the file and wait for completion.
    pub fn flush(&self) -> Result<(), Error> {
        Ok(self.map.flush()?)
    }

    /// Start writing the mapped bytes back to the file.
    pub fn flush_async(&self) -> Result<(), Error> {
        Ok(self.map.flush_async()?)
    }

    fn range(&self, offset: usize, len: usize) -> Result<&[AtomicU8], OutOfBounds> {
        let payload = self.payload();
        offset
            .checked_add(len)
            .and_then(|end| payload.get(offset..end))
            .ok_or(OutOfBounds {
                offset,
                len,
                payload: payload.len(),
            })
    }
}

impl core::fmt::Debug for Region {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Region")
            .field("capacity", &self.capacity())
            .field("created", &self.created)
            .finish()
    }
}
