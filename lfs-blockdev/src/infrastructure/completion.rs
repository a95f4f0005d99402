//! Interrupt-to-task transfer completion.
//!
//! A driver starts a non-blocking transfer, its completion interrupt calls
//! [`TransferSignal::complete`] and the task that issued the transfer is
//! suspended in [`TransferSignal::wait`] until then.
//!
//! # Example
//!
//! ```ignore
//! static QSPI_DONE: TransferSignal<QspiError> = TransferSignal::new();
//!
//! #[interrupt]
//! fn SMIF() {
//!     let status = smif::take_status();
//!     QSPI_DONE.complete(status);
//! }
//!
//! impl SerialFlash for Qspi {
//!     async fn read_async(&mut self, address: u32, buf: &mut [u8]) -> Result<(), QspiError> {
//!         QSPI_DONE.reset();
//!         self.start_read(address, buf)?;
//!         QSPI_DONE.wait().await
//!     }
//!     // ...
//! }
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Single-shot completion carrying a transfer status.
///
/// `complete` takes a critical section and never blocks, so it is safe to
/// call from interrupt context.
pub struct TransferSignal<E> {
    inner: Signal<CriticalSectionRawMutex, Result<(), E>>,
}

impl<E> TransferSignal<E> {
    /// Create an empty signal. Usable in `static` position.
    pub const fn new() -> Self {
        Self {
            inner: Signal::new(),
        }
    }
}

impl<E: Send> TransferSignal<E> {
    /// Record the transfer status and wake the waiting task.
    ///
    /// A second completion before the first is consumed overwrites it.
    pub fn complete(&self, status: Result<(), E>) {
        self.inner.signal(status);
    }

    /// Wait for the next completion and consume it.
    pub async fn wait(&self) -> Result<(), E> {
        self.inner.wait().await
    }

    /// Discard a completion that nobody consumed.
    ///
    /// Call before starting a transfer so a late interrupt from an abandoned
    /// transfer cannot complete the new one.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Whether a completion is pending.
    pub fn is_complete(&self) -> bool {
        self.inner.signaled()
    }
}

impl<E> Default for TransferSignal<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_complete_then_wait() {
        let signal: TransferSignal<()> = TransferSignal::new();
        signal.complete(Ok(()));
        assert!(signal.is_complete());
        assert_eq!(signal.wait().await, Ok(()));
        assert!(!signal.is_complete());
    }

    #[tokio::test]
    async fn test_completion_from_another_thread() {
        let signal: Arc<TransferSignal<u8>> = Arc::new(TransferSignal::new());

        let isr = signal.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            isr.complete(Err(7));
        });

        assert_eq!(signal.wait().await, Err(7));
    }

    #[tokio::test]
    async fn test_reset_discards_stale_completion() {
        let signal: TransferSignal<()> = TransferSignal::new();
        signal.complete(Err(()));
        signal.reset();
        assert!(!signal.is_complete());

        signal.complete(Ok(()));
        assert_eq!(signal.wait().await, Ok(()));
    }

    #[test]
    fn test_static_signal() {
        static DONE: TransferSignal<()> = TransferSignal::new();
        DONE.complete(Ok(()));
        assert!(DONE.is_complete());
        DONE.reset();
    }
}
