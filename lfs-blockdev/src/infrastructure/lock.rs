//! Adapter-wide lock behind the `lock`/`unlock` callbacks.
//!
//! littlefs calls `lock` and `unlock` as two separate callbacks, so the lock
//! cannot be a scoped guard. A one-permit semaphore whose permit is forgotten
//! on `acquire` and handed back on `release` gives the same semantics as an
//! RTOS mutex.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use async_lock::Semaphore;
use embedded_hal_async::delay::DelayNs;

use super::timeout::with_timeout;

/// Errors from [`BusLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockError {
    /// The lock was not released within the wait budget.
    TimedOut,
    /// `release` was called while nobody held the lock.
    NotHeld,
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => write!(f, "Timed out waiting for the block device lock"),
            Self::NotHeld => write!(f, "Block device lock is not held"),
        }
    }
}

impl core::error::Error for LockError {}

/// Single mutual-exclusion token with a bounded acquire.
pub struct BusLock {
    permit: Semaphore,
    held: AtomicBool,
}

impl BusLock {
    /// Create an unlocked token.
    pub fn new() -> Self {
        Self {
            permit: Semaphore::new(1),
            held: AtomicBool::new(false),
        }
    }

    /// Wait up to `timeout_ms` for the token.
    pub async fn acquire<T: DelayNs>(&self, timer: &mut T, timeout_ms: u32) -> Result<(), LockError> {
        let guard = with_timeout(timer, timeout_ms, self.permit.acquire())
            .await
            .map_err(|_| LockError::TimedOut)?;

        // Released explicitly by `release`, not by dropping the guard
        guard.forget();
        self.held.store(true, Ordering::Release);
        Ok(())
    }

    /// Take the token if it is free right now.
    pub fn try_acquire(&self) -> bool {
        match self.permit.try_acquire() {
            Some(guard) => {
                guard.forget();
                self.held.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Hand the token back.
    pub fn release(&self) -> Result<(), LockError> {
        if self.held.swap(false, Ordering::AcqRel) {
            self.permit.add_permits(1);
            Ok(())
        } else {
            Err(LockError::NotHeld)
        }
    }

    /// Whether someone currently holds the token.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Default for BusLock {
    fn default() -> Self {
        Self::new()
    }
}
