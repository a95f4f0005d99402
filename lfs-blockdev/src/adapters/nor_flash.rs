//! [`SerialFlash`] on top of an `embedded-storage` NOR flash driver.
//!
//! Lets HAL flash drivers (ESP, nRF, STM32 internal flash, SPI NOR crates)
//! back a [`SpiFlashBlockDevice`](crate::SpiFlashBlockDevice) without a
//! hand-written driver shim.
//!
//! # Example
//!
//! ```ignore
//! use lfs_blockdev::{NorFlashDriver, SpiFlashBlockDevice, SpiFlashConfig};
//!
//! let flash = NorFlashDriver::new(esp_storage::FlashStorage::new());
//! let config = SpiFlashConfig::default().with_region(0x3C_0000, 0x4_0000);
//! let bd = SpiFlashBlockDevice::create(flash, config, embassy_time::Delay)?;
//! ```

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use crate::domain::SerialFlash;

/// Wraps an `embedded-storage` [`NorFlash`] as a [`SerialFlash`].
///
/// Sector and page sizes are the driver's `ERASE_SIZE` and `WRITE_SIZE`
/// constants, uniform across the device. Reads always block; the default
/// [`SerialFlash::read_async`] is used. Devices past 4 GiB are reported as
/// the largest whole number of sectors that fits 32-bit addressing.
pub struct NorFlashDriver<F> {
    flash: F,
}

impl<F> NorFlashDriver<F> {
    /// Wrap `flash`.
    pub fn new(flash: F) -> Self {
        Self { flash }
    }

    /// Get a reference to the underlying driver.
    pub fn inner(&self) -> &F {
        &self.flash
    }

    /// Consume the wrapper and return the underlying driver.
    pub fn into_inner(self) -> F {
        self.flash
    }
}

impl<F> SerialFlash for NorFlashDriver<F>
where
    F: NorFlash + ReadNorFlash,
{
    type Error = F::Error;

    fn size(&self) -> u32 {
        let capacity = self.flash.capacity();
        match u32::try_from(capacity) {
            Ok(size) => size,
            Err(_) => {
                let sector = (F::ERASE_SIZE as u32).max(1);
                warn!("nor_flash: capacity {} exceeds 32-bit addressing, truncating", capacity);
                u32::MAX / sector * sector
            }
        }
    }

    fn prog_size(&self, _address: u32) -> u32 {
        F::WRITE_SIZE as u32
    }

    fn erase_size(&self, _address: u32) -> u32 {
        F::ERASE_SIZE as u32
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        ReadNorFlash::read(&mut self.flash, address, buf)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error> {
        NorFlash::write(&mut self.flash, address, data)
    }

    fn erase(&mut self, address: u32, len: u32) -> Result<(), Self::Error> {
        NorFlash::erase(&mut self.flash, address, address + len)
    }
}
