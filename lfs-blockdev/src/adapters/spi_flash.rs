//! littlefs block device on SPI NOR flash.
//!
//! Wraps a [`SerialFlash`] driver and exposes it through [`LfsBlockDevice`].
//! Filesystem blocks map one to one onto erase sectors; an optional
//! [`Region`] restricts the filesystem to a window of the device.
//!
//! # Example
//!
//! ```ignore
//! use lfs_blockdev::{SpiFlashBlockDevice, SpiFlashConfig};
//!
//! // Last 1MB of a 16MB part, everything before it belongs to firmware
//! let config = SpiFlashConfig::default().with_region(0xF0_0000, 0x10_0000);
//! let bd = SpiFlashBlockDevice::create(qspi, config, embassy_time::Delay)?;
//! assert_eq!(bd.geometry().block_count, 256);
//! ```

use async_lock::Mutex;
use embedded_hal_async::delay::DelayNs;

use crate::domain::{
    BdError, CreateError, Geometry, GeometryError, LfsBlockDevice, Region, SerialFlash,
    geometry::lookahead_for, lfs_status,
};
use crate::infrastructure::{BusLock, with_timeout};

/// Erase cycles per block before littlefs relocates metadata.
pub const DEFAULT_BLOCK_CYCLES: u32 = 512;

/// Wait budget for an interrupt-completed read.
pub const DEFAULT_READ_TIMEOUT_MS: u32 = 500;

/// Wait budget for `lock`.
pub const DEFAULT_LOCK_TIMEOUT_MS: u32 = 500;

/// Serial flash reads are byte granular.
const READ_SIZE: u32 = 1;

/// Configuration for [`SpiFlashBlockDevice`].
///
/// `Default` gives the whole device, interrupt-completed reads, no locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiFlashConfig {
    /// Window of the device given to the filesystem; `None` for all of it.
    pub region: Option<Region>,
    /// Issue reads through [`SerialFlash::read_async`] and suspend until the
    /// completion interrupt. Disable for execute-in-place from the same flash
    /// or when the data cache is not coherent with the controller's DMA.
    pub async_read: bool,
    /// Create a [`BusLock`] behind `lock`/`unlock`.
    pub thread_safe: bool,
    /// Wait budget for an interrupt-completed read.
    pub read_timeout_ms: u32,
    /// Wait budget for `lock`.
    pub lock_timeout_ms: u32,
    /// Erase cycles per block before littlefs relocates metadata.
    pub block_cycles: u32,
}

impl SpiFlashConfig {
    /// Default configuration.
    pub const fn new() -> Self {
        Self {
            region: None,
            async_read: true,
            thread_safe: false,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            block_cycles: DEFAULT_BLOCK_CYCLES,
        }
    }

    /// Restrict the filesystem to `size` bytes starting at `start`.
    ///
    /// Geometry is taken from the sector at `start`, so on hybrid parts the
    /// window must lie inside one uniform sector area.
    pub const fn with_region(mut self, start: u32, size: u32) -> Self {
        self.region = Some(Region::new(start, size));
        self
    }

    /// Use blocking reads only.
    pub const fn blocking_reads(mut self) -> Self {
        self.async_read = false;
        self
    }

    /// Enable the `lock`/`unlock` token.
    pub const fn thread_safe(mut self) -> Self {
        self.thread_safe = true;
        self
    }
}

impl Default for SpiFlashConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// littlefs block device on a serial NOR flash driver.
///
/// The driver sits behind an async mutex so the adapter can be shared by
/// reference between tasks; the optional [`BusLock`] additionally lets the
/// filesystem make a sequence of calls atomic.
pub struct SpiFlashBlockDevice<F, T> {
    flash: Mutex<F>,
    timer: T,
    config: SpiFlashConfig,
    region: Region,
    geometry: Geometry,
    lock: Option<BusLock>,
}

impl<F, T> SpiFlashBlockDevice<F, T>
where
    F: SerialFlash,
    T: DelayNs + Clone,
{
    /// Create an adapter, deriving geometry from the driver.
    ///
    /// `block_size` is the erase size and `prog_size` the page size at the
    /// start of the window; the block count is however many whole sectors fit
    /// in the window.
    ///
    /// # Errors
    ///
    /// - [`CreateError::RegionOutOfBounds`] if the window ends past the device
    /// - [`CreateError::UnalignedRegion`] if the window does not start on a sector
    /// - [`CreateError::Geometry`] if the derived geometry is unusable
    pub fn create(flash: F, config: SpiFlashConfig, timer: T) -> Result<Self, CreateError<F::Error>> {
        let device_size = flash.size();
        let region = config.region.unwrap_or(Region::whole(device_size));
        trace!(
            "spi_flash_bd: create(start={:#x}, size={:#x}, device={:#x})",
            region.start,
            region.size,
            device_size
        );

        if !region.fits_in(device_size) {
            return Err(CreateError::RegionOutOfBounds {
                start: region.start,
                size: region.size,
                device_size,
            });
        }

        let erase_size = flash.erase_size(region.start);
        if erase_size == 0 {
            return Err(GeometryError::ZeroSize.into());
        }
        if region.start % erase_size != 0 {
            return Err(CreateError::UnalignedRegion {
                start: region.start,
                erase_size,
            });
        }

        let prog_size = flash.prog_size(region.start);
        let block_count = region.size / erase_size;
        let geometry = Geometry {
            read_size: READ_SIZE,
            prog_size,
            block_size: erase_size,
            block_count,
            cache_size: prog_size,
            lookahead_size: lookahead_for(block_count),
            block_cycles: Some(config.block_cycles),
        };
        geometry.validate()?;

        debug!(
            "spi_flash_bd: {} blocks of {} bytes, prog {} bytes, async reads {}",
            geometry.block_count,
            geometry.block_size,
            geometry.prog_size,
            config.async_read
        );

        Ok(Self {
            flash: Mutex::new(flash),
            timer,
            config,
            region,
            geometry,
            lock: if config.thread_safe { Some(BusLock::new()) } else { None },
        })
    }
}

impl<F, T> SpiFlashBlockDevice<F, T> {
    /// The window of the device the filesystem sees.
    pub fn region(&self) -> Region {
        self.region
    }

    /// The configuration the adapter was created with.
    pub fn config(&self) -> &SpiFlashConfig {
        &self.config
    }

    /// Tear the adapter down and hand the driver back.
    ///
    /// The region window and lock token go away with the adapter.
    pub fn destroy(self) -> F {
        trace!("spi_flash_bd: destroy");
        self.flash.into_inner()
    }

    /// Device address of `offset` within `block`.
    #[inline]
    fn address(&self, block: u32, offset: u32) -> u32 {
        self.region.start + block * self.geometry.block_size + offset
    }

    /// Panic unless the access honours the filesystem contract.
    fn check_access(&self, block: u32, offset: u32, len: usize, granularity: u32) {
        assert!(
            block < self.geometry.block_count,
            "block {} out of range ({} blocks)",
            block,
            self.geometry.block_count
        );
        assert!(
            offset % granularity == 0,
            "offset {} is not a multiple of {}",
            offset,
            granularity
        );
        assert!(
            len % granularity as usize == 0,
            "length {} is not a multiple of {}",
            len,
            granularity
        );
        let end = block as u64 * self.geometry.block_size as u64 + offset as u64 + len as u64;
        assert!(
            end <= self.region.size as u64,
            "access of {} bytes at block {} offset {} runs past the region",
            len,
            block,
            offset
        );
    }
}

fn collapse<E>(op: &str, address: u32, result: Result<(), E>) -> Result<(), BdError> {
    result.map_err(|_| {
        warn!("spi_flash_bd: {} failed at {:#x}", op, address);
        BdError
    })
}

impl<F, T> LfsBlockDevice for SpiFlashBlockDevice<F, T>
where
    F: SerialFlash,
    T: DelayNs + Clone,
{
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    async fn read(&self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), BdError> {
        trace!("spi_flash_bd: read(block={:#x}, off={}, len={})", block, offset, buf.len());
        self.check_access(block, offset, buf.len(), self.geometry.read_size);

        let address = self.address(block, offset);
        let mut flash = self.flash.lock().await;

        let result = if self.config.async_read {
            let mut timer = self.timer.clone();
            let outcome = with_timeout(&mut timer, self.config.read_timeout_ms, flash.read_async(address, buf)).await;
            match outcome {
                Ok(status) => collapse("read", address, status),
                Err(_) => {
                    warn!(
                        "spi_flash_bd: read at {:#x} timed out after {} ms",
                        address,
                        self.config.read_timeout_ms
                    );
                    if flash.abort_transfer().is_err() {
                        error!("spi_flash_bd: abort after timeout failed");
                    }
                    Err(BdError)
                }
            }
        } else {
            collapse("read", address, flash.read(address, buf))
        };

        trace!("spi_flash_bd: read -> {}", lfs_status(result));
        result
    }

    async fn prog(&self, block: u32, offset: u32, data: &[u8]) -> Result<(), BdError> {
        trace!("spi_flash_bd: prog(block={:#x}, off={}, len={})", block, offset, data.len());
        self.check_access(block, offset, data.len(), self.geometry.prog_size);

        let address = self.address(block, offset);
        let result = collapse("prog", address, self.flash.lock().await.write(address, data));

        trace!("spi_flash_bd: prog -> {}", lfs_status(result));
        result
    }

    async fn erase(&self, block: u32) -> Result<(), BdError> {
        trace!("spi_flash_bd: erase(block={:#x})", block);
        self.check_access(block, 0, 0, 1);

        let address = self.address(block, 0);
        let result = collapse(
            "erase",
            address,
            self.flash.lock().await.erase(address, self.geometry.block_size),
        );

        trace!("spi_flash_bd: erase -> {}", lfs_status(result));
        result
    }

    async fn sync(&self) -> Result<(), BdError> {
        // No write cache between the controller and the array
        trace!("spi_flash_bd: sync -> 0");
        Ok(())
    }

    fn is_thread_safe(&self) -> bool {
        self.lock.is_some()
    }

    async fn lock(&self) -> Result<(), BdError> {
        let Some(lock) = &self.lock else {
            return Ok(());
        };
        let mut timer = self.timer.clone();
        lock.acquire(&mut timer, self.config.lock_timeout_ms)
            .await
            .map_err(|e| {
                warn!("spi_flash_bd: lock failed: {}", e);
                BdError
            })
    }

    async fn unlock(&self) -> Result<(), BdError> {
        let Some(lock) = &self.lock else {
            return Ok(());
        };
        lock.release().map_err(|e| {
            warn!("spi_flash_bd: unlock failed: {}", e);
            BdError
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFlash, Op, TokioDelay};

    const SIZE: usize = 64 * 1024;

    fn adapter(config: SpiFlashConfig) -> SpiFlashBlockDevice<MockFlash, TokioDelay> {
        SpiFlashBlockDevice::create(MockFlash::new(SIZE, 256, 4096), config, TokioDelay).unwrap()
    }

    #[test]
    fn test_geometry_from_driver() {
        let bd = adapter(SpiFlashConfig::default());
        let geometry = bd.geometry();

        assert_eq!(geometry.read_size, 1);
        assert_eq!(geometry.prog_size, 256);
        assert_eq!(geometry.block_size, 4096);
        assert_eq!(geometry.block_count, 16);
        assert_eq!(geometry.cache_size, 256);
        assert_eq!(geometry.lookahead_size, 8);
        assert_eq!(geometry.block_cycles, Some(512));
        assert_eq!(geometry.validate(), Ok(()));
        assert_eq!(bd.region(), Region::whole(SIZE as u32));
    }

    #[test]
    fn test_geometry_from_region() {
        let bd = adapter(SpiFlashConfig::default().with_region(0x8000, 0x6000));
        assert_eq!(bd.geometry().block_count, 6);
        assert_eq!(bd.region(), Region::new(0x8000, 0x6000));
    }

    #[test]
    fn test_region_past_device_end() {
        let config = SpiFlashConfig::default().with_region(0xF000, 0x2000);
        let result = SpiFlashBlockDevice::create(MockFlash::new(SIZE, 256, 4096), config, TokioDelay);
        assert!(matches!(
            result,
            Err(CreateError::RegionOutOfBounds { start: 0xF000, size: 0x2000, .. })
        ));
    }

    #[test]
    fn test_unaligned_region() {
        let config = SpiFlashConfig::default().with_region(0x100, 0x2000);
        let result = SpiFlashBlockDevice::create(MockFlash::new(SIZE, 256, 4096), config, TokioDelay);
        assert!(matches!(
            result,
            Err(CreateError::UnalignedRegion { start: 0x100, erase_size: 4096 })
        ));
    }

    #[test]
    fn test_region_smaller_than_a_block() {
        let config = SpiFlashConfig::default().with_region(0, 0x800);
        let result = SpiFlashBlockDevice::create(MockFlash::new(SIZE, 256, 4096), config, TokioDelay);
        assert!(matches!(result, Err(CreateError::Geometry(GeometryError::NoBlocks))));
    }

    #[test]
    fn test_prog_size_must_divide_erase_size() {
        let result = SpiFlashBlockDevice::create(
            MockFlash::new(SIZE, 3000, 4096),
            SpiFlashConfig::default(),
            TokioDelay,
        );
        assert!(matches!(
            result,
            Err(CreateError::Geometry(GeometryError::BlockNotMultipleOfCache { .. }))
        ));
    }

    #[tokio::test]
    async fn test_address_translation() {
        let bd = adapter(SpiFlashConfig::default().with_region(0x4000, 0x8000));

        let mut buf = [0u8; 16];
        bd.read(2, 0x10, &mut buf).await.unwrap();
        bd.prog(3, 0x100, &[0u8; 256]).await.unwrap();
        bd.erase(1).await.unwrap();

        let flash = bd.destroy();
        assert_eq!(
            flash.ops,
            vec![
                Op::ReadAsync { address: 0x4000 + 2 * 4096 + 0x10, len: 16 },
                Op::Write { address: 0x4000 + 3 * 4096 + 0x100, len: 256 },
                Op::Erase { address: 0x4000 + 4096, len: 4096 },
            ]
        );
    }

    #[tokio::test]
    async fn test_prog_read_round_trip() {
        let bd = adapter(SpiFlashConfig::default());
        let data: Vec<u8> = (0..512).map(|i| i as u8).collect();

        bd.erase(5).await.unwrap();
        bd.prog(5, 256, &data).await.unwrap();

        let mut read_back = vec![0u8; 512];
        bd.read(5, 256, &mut read_back).await.unwrap();
        assert_eq!(read_back, data);
    }

    #[tokio::test]
    async fn test_blocking_reads() {
        let bd = adapter(SpiFlashConfig::default().blocking_reads());

        let mut buf = [0u8; 4];
        bd.read(0, 0, &mut buf).await.unwrap();
        assert_eq!(buf, [0xFF; 4]);

        assert_eq!(bd.destroy().ops, vec![Op::Read { address: 0, len: 4 }]);
    }

    #[tokio::test]
    async fn test_read_timeout_aborts_transfer() {
        let mut flash = MockFlash::new(SIZE, 256, 4096);
        flash.stall_async = true;
        let config = SpiFlashConfig {
            read_timeout_ms: 10,
            ..SpiFlashConfig::default()
        };
        let bd = SpiFlashBlockDevice::create(flash, config, TokioDelay).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(bd.read(0, 0, &mut buf).await, Err(BdError));

        let flash = bd.destroy();
        assert_eq!(flash.ops.last(), Some(&Op::Abort));
    }

    #[tokio::test]
    async fn test_driver_failure_collapses() {
        let mut flash = MockFlash::new(SIZE, 256, 4096);
        flash.fail = true;
        let bd = SpiFlashBlockDevice::create(flash, SpiFlashConfig::default(), TokioDelay).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(lfs_status(bd.read(0, 0, &mut buf).await), -1);
        assert_eq!(lfs_status(bd.prog(0, 0, &[0u8; 256]).await), -1);
        assert_eq!(lfs_status(bd.erase(0).await), -1);
    }

    #[tokio::test]
    async fn test_sync_touches_nothing() {
        let bd = adapter(SpiFlashConfig::default());
        assert_eq!(bd.sync().await, Ok(()));
        assert!(bd.destroy().ops.is_empty());
    }

    #[tokio::test]
    async fn test_lock_unlock() {
        let bd = adapter(SpiFlashConfig {
            lock_timeout_ms: 10,
            ..SpiFlashConfig::default().thread_safe()
        });
        assert!(bd.is_thread_safe());

        bd.lock().await.unwrap();
        assert_eq!(bd.lock().await, Err(BdError));
        bd.unlock().await.unwrap();
        assert_eq!(bd.unlock().await, Err(BdError));
    }

    #[tokio::test]
    async fn test_lock_is_noop_without_thread_safety() {
        let bd = adapter(SpiFlashConfig::default());
        assert!(!bd.is_thread_safe());
        assert_eq!(bd.lock().await, Ok(()));
        assert_eq!(bd.lock().await, Ok(()));
        assert_eq!(bd.unlock().await, Ok(()));
    }

    #[tokio::test]
    #[should_panic(expected = "out of range")]
    async fn test_block_out_of_range() {
        let bd = adapter(SpiFlashConfig::default());
        let _ = bd.erase(16).await;
    }

    #[tokio::test]
    #[should_panic(expected = "not a multiple of 256")]
    async fn test_misaligned_prog_offset() {
        let bd = adapter(SpiFlashConfig::default());
        let _ = bd.prog(0, 16, &[0u8; 256]).await;
    }

    #[tokio::test]
    #[should_panic(expected = "not a multiple of 256")]
    async fn test_misaligned_prog_length() {
        let bd = adapter(SpiFlashConfig::default());
        let _ = bd.prog(0, 0, &[0u8; 100]).await;
    }

    #[tokio::test]
    #[should_panic(expected = "runs past the region")]
    async fn test_read_past_region() {
        let bd = adapter(SpiFlashConfig::default().with_region(0, 0x2000));
        let mut buf = [0u8; 32];
        let _ = bd.read(1, 4080, &mut buf).await;
    }

    #[test]
    fn test_config_builders() {
        let config = SpiFlashConfig::default()
            .with_region(0x1000, 0x2000)
            .blocking_reads()
            .thread_safe();

        assert_eq!(config.region, Some(Region::new(0x1000, 0x2000)));
        assert!(!config.async_read);
        assert!(config.thread_safe);
        assert_eq!(config.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
    }
}
