//! Infrastructure layer - synchronization primitives the adapters build on.
//!
//! - [`TransferSignal`]: completion handoff from a driver interrupt to the
//!   waiting task
//! - [`BusLock`]: the optional lock token behind `lock`/`unlock`
//! - [`with_timeout`]: bounded waits driven by any `DelayNs`

mod completion;
mod lock;
mod timeout;

pub use completion::TransferSignal;
pub use lock::{BusLock, LockError};
pub use timeout::{TimedOut, with_timeout};
