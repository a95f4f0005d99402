//! Host-side drivers for `lfs-blockdev`.
//!
//! Simulated serial flash and SD card hosts that behave like the real parts
//! closely enough to exercise the adapters end to end: NOR bit semantics,
//! sector-granular erases, interrupt-completed transfers and injected faults.
//!
//! - [`RamFlash`]: [`SerialFlash`](lfs_blockdev::SerialFlash) over a byte image
//! - [`RamCard`]: [`SdHost`](lfs_blockdev::SdHost) over a sector image
//! - [`StreamCard`]: `SdHost` over any `embedded-io-async` stream, e.g. a card image file
//! - [`TokioDelay`]: adapter timer on the tokio runtime
//! - [`Probe`]: fault injection and access counting shared with a simulated device

mod delay;
mod irq;
mod probe;
mod ram_card;
mod ram_flash;
mod stream;

pub use delay::TokioDelay;
pub use probe::Probe;
pub use ram_card::{RamCard, RamCardError};
pub use ram_flash::{ERASED, RamFlash, RamFlashError};
pub use stream::{StreamCard, StreamCardError};
