//! Adapter layer - block devices built on the domain's driver ports.
//!
//! # Hexagonal Architecture
//!
//! ```text
//!     ┌──────────────────────────────────┐
//!     │      Domain Layer                │
//!     │  - LfsBlockDevice (port)         │
//!     │  - SerialFlash / SdHost (ports)  │
//!     └────────────┬─────────────────────┘
//!                  │
//!                  │ implements
//!                  ▼
//!     ┌──────────────────────────────────┐
//!     │      Adapter Layer               │  ◄── This module
//!     │  - SpiFlashBlockDevice           │
//!     │  - SdBlockDevice                 │
//!     │  - NorFlashDriver                │
//!     └────────────┬─────────────────────┘
//!                  │
//!                  │ uses
//!                  ▼
//!     ┌──────────────────────────────────┐
//!     │  Infrastructure                  │
//!     │  (BusLock, TransferSignal,       │
//!     │   with_timeout)                  │
//!     └──────────────────────────────────┘
//! ```
//!
//! # Available Adapters
//!
//! - **`SpiFlashBlockDevice`**: SPI/QSPI NOR flash, optionally windowed to a region
//! - **`SdBlockDevice`**: SD/MMC cards through an SD host controller
//! - **`NorFlashDriver`**: `embedded-storage` NOR drivers as `SerialFlash` (feature `embedded-storage`)

mod sd;
mod spi_flash;

#[cfg(feature = "embedded-storage")]
mod nor_flash;

pub use sd::{SD_BLOCK_SIZE, SdBlockDevice, SdConfig};
pub use spi_flash::{
    DEFAULT_BLOCK_CYCLES, DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS, SpiFlashBlockDevice,
    SpiFlashConfig,
};

#[cfg(feature = "embedded-storage")]
pub use nor_flash::NorFlashDriver;
