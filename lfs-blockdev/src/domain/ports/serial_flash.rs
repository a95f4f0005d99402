//! SerialFlash port - the serial-flash / QSPI driver the NOR adapter drives.

use core::fmt::Debug;

/// Driver for a memory-mapped or command-driven SPI NOR flash.
///
/// All addresses are absolute byte addresses on the device. Implementations
/// are expected to be fully initialized (pins, clocks, SFDP discovery) before
/// they are handed to an adapter.
///
/// # Completion model
///
/// [`read_async`](Self::read_async) starts a non-blocking transfer and resolves
/// once the controller's completion interrupt fires. Drivers typically
/// implement it with a [`TransferSignal`](crate::TransferSignal) that the
/// interrupt handler completes. Drivers without such a path keep the default,
/// which performs the blocking read.
pub trait SerialFlash {
    /// Driver error type.
    type Error: Debug;

    /// Total device size in bytes.
    fn size(&self) -> u32;

    /// Program page size of the sector containing `address`.
    fn prog_size(&self, address: u32) -> u32;

    /// Erase sector size of the sector containing `address`.
    ///
    /// May differ across the device on hybrid-sector parts.
    fn erase_size(&self, address: u32) -> u32;

    /// Blocking read of `buf.len()` bytes starting at `address`.
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Blocking program of `data` at `address`. The target must be erased.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Blocking erase of `len` bytes starting at `address`.
    fn erase(&mut self, address: u32, len: u32) -> Result<(), Self::Error>;

    /// Non-blocking read completed by the controller interrupt.
    async fn read_async(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.read(address, buf)
    }

    /// Return the controller to idle after a transfer was abandoned.
    fn abort_transfer(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<T: SerialFlash + ?Sized> SerialFlash for &mut T {
    type Error = T::Error;

    fn size(&self) -> u32 {
        T::size(self)
    }

    fn prog_size(&self, address: u32) -> u32 {
        T::prog_size(self, address)
    }

    fn erase_size(&self, address: u32) -> u32 {
        T::erase_size(self, address)
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        T::read(self, address, buf)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error> {
        T::write(self, address, data)
    }

    fn erase(&mut self, address: u32, len: u32) -> Result<(), Self::Error> {
        T::erase(self, address, len)
    }

    async fn read_async(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        T::read_async(self, address, buf).await
    }

    fn abort_transfer(&mut self) -> Result<(), Self::Error> {
        T::abort_transfer(self)
    }
}
