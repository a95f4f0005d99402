//! SdHost port - the SDHC card-host driver the SD adapter drives.

use core::fmt::Debug;

/// Driver for an SD/MMC card behind an SD host controller.
///
/// Addresses are card sector numbers; every transfer moves whole
/// [`SD_BLOCK_SIZE`](crate::SD_BLOCK_SIZE)-byte sectors. Transfers are issued
/// without blocking and resolve when the host signals transfer-complete.
pub trait SdHost {
    /// Driver error type.
    type Error: Debug;

    /// Number of sectors on the inserted card.
    fn block_count(&self) -> Result<u32, Self::Error>;

    /// Read `buf.len() / 512` sectors starting at `block`.
    async fn read_blocks(&mut self, block: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `data.len() / 512` sectors starting at `block`.
    async fn write_blocks(&mut self, block: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Erase `count` sectors starting at `block`.
    async fn erase(&mut self, block: u32, count: u32) -> Result<(), Self::Error>;

    /// Return the host to idle after a transfer was abandoned.
    fn abort_transfer(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<T: SdHost + ?Sized> SdHost for &mut T {
    type Error = T::Error;

    fn block_count(&self) -> Result<u32, Self::Error> {
        T::block_count(self)
    }

    async fn read_blocks(&mut self, block: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        T::read_blocks(self, block, buf).await
    }

    async fn write_blocks(&mut self, block: u32, data: &[u8]) -> Result<(), Self::Error> {
        T::write_blocks(self, block, data).await
    }

    async fn erase(&mut self, block: u32, count: u32) -> Result<(), Self::Error> {
        T::erase(self, block, count).await
    }

    fn abort_transfer(&mut self) -> Result<(), Self::Error> {
        T::abort_transfer(self)
    }
}
