//! A single value, persisted in a memory-mapped file and shared between threads and processes.
//!
//! The file starts with a lock word. Every party mapping the file takes that spinlock to read or
//! write the encoded value behind it, which gives atomic `get`, `put` and read-modify-write
//! `get_and_put` across every handle of the file.
//!
//! ```no_run
//! use shm_value::ShmValue;
//!
//! let counter = ShmValue::<u32>::open("/tmp/counter", 4, || 0)?;
//! let next = counter.get_and_put(|n| n + 1)?;
//! assert!(next >= 1);
//! # Ok::<_, shm_value::Error>(())
//! ```
//!
//! ## Not a database
//!
//! Writes go to the shared mapping, the operating system decides when pages reach the drive. A
//! crash during a write can leave a torn payload, which then fails to decode. Use
//! [`ShmValue::flush`] or [`ShmValue::close`] to force write-back.
//!
//! ## Lock visibility
//!
//! The lock is unfair and never times out, see [`SpinLock`]. With [`Visibility::Relaxed`] the
//! lock word is accessed with relaxed ordering. That is only sound for a file owned by a single
//! thread.
mod codec;
mod error;
pub mod layout;
mod lock;
mod options;
mod region;
mod value;

#[cfg(test)]
mod tests;

pub use codec::{Bincode, Codec, CodecError, Pod};
pub use error::{Error, Result};
pub use lock::{Backoff, LockGuard, SpinLock, Visibility, LOCKED, UNLOCKED};
pub use options::Options;
pub use region::{OutOfBounds, Region};
pub use value::ShmValue;
