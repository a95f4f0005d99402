//! Shared fault injection and access counting for the simulated drivers.
//!
//! A driver is moved into its adapter, so tests keep a [`Probe`] clone to
//! poke at it from the outside.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct ProbeState {
    fail_next: AtomicBool,
    stalled: AtomicBool,
    removed: AtomicBool,
    accesses: AtomicUsize,
    aborts: AtomicUsize,
}

/// Handle onto a simulated driver's fault state.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    state: Arc<ProbeState>,
}

impl Probe {
    /// Fail the next driver operation with an injected error.
    pub fn fail_next(&self) {
        self.state.fail_next.store(true, Ordering::SeqCst);
    }

    /// Start transfers but never raise their completion interrupt.
    pub fn set_stalled(&self, stalled: bool) {
        self.state.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Pull the medium out of the slot (or put it back).
    pub fn set_removed(&self, removed: bool) {
        self.state.removed.store(removed, Ordering::SeqCst);
    }

    /// Driver operations issued so far.
    pub fn accesses(&self) -> usize {
        self.state.accesses.load(Ordering::SeqCst)
    }

    /// Transfers abandoned through `abort_transfer`.
    pub fn aborts(&self) -> usize {
        self.state.aborts.load(Ordering::SeqCst)
    }

    pub(crate) fn record_access(&self) {
        self.state.accesses.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_abort(&self) {
        self.state.aborts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn take_failure(&self) -> bool {
        self.state.fail_next.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn is_stalled(&self) -> bool {
        self.state.stalled.load(Ordering::SeqCst)
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.state.removed.load(Ordering::SeqCst)
    }
}
