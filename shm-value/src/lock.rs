//! A spinlock over a word of shared memory.
//!
//! The lock is unfair. Waiters race for every release and under sustained contention a single
//! waiter may be passed over for arbitrarily long. Acquisition never blocks in the kernel, never
//! times out and can not be cancelled. Holders are not tracked: a second `acquire` by the holder
//! spins forever, and [`SpinLock::release`] unlocks no matter who calls it.
use core::sync::atomic::{AtomicU32, Ordering};

pub const UNLOCKED: u32 = 0;
pub const LOCKED: u32 = 1;

/// The memory ordering used on the lock word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Acquire on locking, release on unlocking.
    ///
    /// Everything a holder wrote before its release is visible to the next successful acquirer,
    /// in this process or in any other process mapping the file.
    #[default]
    Ordered,
    /// Relaxed loads and stores on the lock word.
    ///
    /// Mutual exclusion on the word itself still holds, but the payload written by one holder is
    /// not guaranteed to be visible to the next. Only use this when a single thread exclusively
    /// owns the file, never to coordinate threads or processes.
    Relaxed,
}

/// What a waiter does between two failed attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Busy wait with a spin-loop hint.
    Spin,
    /// Busy wait for `spins` attempts, then yield to the scheduler between attempts.
    Yield { spins: u32 },
}

/// A view of a lock word.
#[derive(Clone, Copy, Debug)]
pub struct SpinLock<'lt> {
    word: &'lt AtomicU32,
    visibility: Visibility,
    backoff: Backoff,
}

/// Proof of holding a [`SpinLock`]. Releases on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockGuard<'lt> {
    lock: SpinLock<'lt>,
}

impl Visibility {
    fn acquire(self) -> Ordering {
        match self {
            Visibility::Ordered => Ordering::Acquire,
            Visibility::Relaxed => Ordering::Relaxed,
        }
    }

    fn release(self) -> Ordering {
        match self {
            Visibility::Ordered => Ordering::Release,
            Visibility::Relaxed => Ordering::Relaxed,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Yield { spins: 64 }
    }
}

impl Backoff {
    fn snooze(self, attempt: &mut u32) {
        match self {
            Backoff::Spin => core::hint::spin_loop(),
            Backoff::Yield { spins } if *attempt < spins => {
                *attempt += 1;
                core::hint::spin_loop();
            }
            Backoff::Yield { .. } => std::thread::yield_now(),
        }
    }
}

impl<'lt> SpinLock<'lt> {
    pub fn new(word: &'lt AtomicU32, visibility: Visibility, backoff: Backoff) -> Self {
        SpinLock {
            word,
            visibility,
            backoff,
        }
    }

    /// Spin until the word is swapped from unlocked to locked by us.
    pub fn acquire(self) -> LockGuard<'lt> {
        let mut attempt = 0;

        loop {
            if let Some(guard) = self.try_acquire() {
                return guard;
            }

            self.backoff.snooze(&mut attempt);
        }
    }

    /// A single attempt: observe the word unlocked, then one compare-and-swap.
    pub fn try_acquire(self) -> Option<LockGuard<'lt>> {
        if self.word.load(self.visibility.acquire()) != UNLOCKED {
            return None;
        }

        self.word
            .compare_exchange(
                UNLOCKED,
                LOCKED,
                self.visibility.acquire(),
                Ordering::Relaxed,
            )
            .ok()?;

        Some(LockGuard { lock: self })
    }

    /// Unconditionally store `UNLOCKED`.
    ///
    /// Only the current holder may call this, which dropping a [`LockGuard`] does. Anyone else
    /// silently breaks mutual exclusion for the holder.
    pub fn release(self) {
        self.word.store(UNLOCKED, self.visibility.release());
    }

    pub fn is_locked(self) -> bool {
        self.word.load(Ordering::Relaxed) != UNLOCKED
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
