//! Domain layer - geometry, region windows, ports and errors.
//!
//! Nothing in here touches a driver. The adapters in [`crate::adapters`] are
//! the only code that connects these contracts to hardware.
//!
//! ```text
//!     ┌──────────────────────────────────┐
//!     │   Filesystem core (external)     │
//!     └────────────┬─────────────────────┘
//!                  │ consumes
//!                  ▼
//!     ┌──────────────────────────────────┐
//!     │  LfsBlockDevice port             │  ◄── ports::block_device
//!     │  Geometry / Region               │
//!     └────────────┬─────────────────────┘
//!                  │ implemented by adapters on top of
//!                  ▼
//!     ┌──────────────────────────────────┐
//!     │  SerialFlash / SdHost ports      │  ◄── driver contracts
//!     └──────────────────────────────────┘
//! ```

pub mod error;
pub mod geometry;
pub mod ports;
pub mod region;

pub use error::{BdError, CreateError, LFS_ERR, LFS_OK, lfs_status};
pub use geometry::{Geometry, GeometryError, lookahead_for};
pub use ports::{LfsBlockDevice, SdHost, SerialFlash};
pub use region::Region;
