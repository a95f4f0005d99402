//! Simulated completion interrupts.
//!
//! The simulated controllers move data synchronously, then report the status
//! from a separate thread the way a hardware interrupt would, and the issuing
//! task waits on the [`TransferSignal`].

use std::sync::Arc;

use lfs_blockdev::TransferSignal;

use crate::probe::Probe;

/// Report `status` through `line` and wait for it.
///
/// A stalled probe swallows the interrupt, so the wait never finishes.
pub(crate) async fn complete<E>(line: &Arc<TransferSignal<E>>, probe: &Probe, status: Result<(), E>) -> Result<(), E>
where
    E: Send + 'static,
{
    line.reset();
    if probe.is_stalled() {
        log::debug!("irq: completion swallowed");
    } else {
        let line = Arc::clone(line);
        std::thread::spawn(move || line.complete(status));
    }
    line.wait().await
}
