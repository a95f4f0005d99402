//! Ports - interfaces to the outside world.
//!
//! - **Driven ports** (drivers we call): [`SerialFlash`], [`SdHost`]
//! - **Driving port** (what the filesystem calls): [`LfsBlockDevice`]

mod block_device;
mod sd_host;
mod serial_flash;

pub use block_device::LfsBlockDevice;
pub use sd_host::SdHost;
pub use serial_flash::SerialFlash;
