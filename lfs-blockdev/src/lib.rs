//! littlefs block device adapters for SPI NOR flash and SD/MMC cards.
//!
//! This crate sits between a littlefs-style flash filesystem and an
//! already-initialized storage driver. It translates the filesystem's
//! `(block, offset, length)` requests into device addresses, calls the driver,
//! waits for interrupt-driven completion where the driver offers it and
//! collapses every driver failure into a single [`BdError`].
//!
//! # Architecture
//!
//! The crate is organized into three layers:
//!
//! ## Domain Layer (`domain`)
//! Pure data and contracts:
//! - **Geometry**: [`Geometry`] and its invariants
//! - **Region**: [`Region`], a byte window on a larger NOR device
//! - **Ports**: [`SerialFlash`] and [`SdHost`] (drivers we consume),
//!   [`LfsBlockDevice`] (the callback record the filesystem consumes)
//! - **Errors**: [`BdError`], [`CreateError`], [`GeometryError`]
//!
//! ## Adapter Layer (`adapters`)
//! - **`SpiFlashBlockDevice`**: implements `LfsBlockDevice` on a `SerialFlash`
//! - **`SdBlockDevice`**: implements `LfsBlockDevice` on an `SdHost`
//! - **`NorFlashDriver`**: `embedded-storage` bridge (feature `embedded-storage`)
//!
//! ## Infrastructure Layer (`infrastructure`)
//! - [`TransferSignal`]: interrupt-to-task completion signal
//! - [`BusLock`]: the optional adapter-wide lock token
//! - [`with_timeout`]: bounded waits on top of `DelayNs`
//!
//! # Quick Start
//!
//! ```ignore
//! use lfs_blockdev::{LfsBlockDevice, SpiFlashBlockDevice, SpiFlashConfig, lfs_status};
//!
//! let config = SpiFlashConfig::default().with_region(0x10_0000, 0x10_0000);
//! let bd = SpiFlashBlockDevice::create(qspi, config, embassy_time::Delay)?;
//!
//! bd.erase(0).await?;
//! bd.prog(0, 0, &page).await?;
//! let status = lfs_status(bd.read(0, 0, &mut buf).await);
//! assert_eq!(status, 0);
//! ```
//!
//! # Features
//!
//! - `std`: Enable standard library features
//! - `log`: Enable logging support
//! - `defmt`: Enable defmt logging for embedded
//! - `embedded-storage`: Bridge `embedded-storage` NOR flash drivers

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![allow(async_fn_in_trait)]

#[macro_use]
mod fmt;

// Core layers
pub mod domain;
pub mod adapters;
pub mod infrastructure;

#[cfg(test)]
mod testing;

pub use domain::{
    BdError, CreateError, Geometry, GeometryError, LfsBlockDevice, Region, SdHost, SerialFlash,
    LFS_ERR, LFS_OK, lfs_status,
};

pub use adapters::{SdBlockDevice, SdConfig, SpiFlashBlockDevice, SpiFlashConfig, SD_BLOCK_SIZE};

#[cfg(feature = "embedded-storage")]
pub use adapters::NorFlashDriver;

pub use infrastructure::{BusLock, LockError, TimedOut, TransferSignal, with_timeout};

// Re-export the delay trait adapters are generic over
pub use embedded_hal_async::delay::DelayNs;
