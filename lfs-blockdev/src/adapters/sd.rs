//! littlefs block device on an SD/MMC card.
//!
//! Every filesystem block is one 512-byte card sector. Transfers go through
//! the [`SdHost`] driver and resolve on the host's transfer-complete
//! interrupt.
//!
//! The card's controller runs its own flash translation layer, so the
//! filesystem's `erase` hook does nothing: overwriting a sector is enough.
//! [`SdBlockDevice::erase_sector`] is there for callers that want an
//! explicit card-level erase anyway.

use async_lock::Mutex;
use embedded_hal_async::delay::DelayNs;

use crate::domain::{
    BdError, CreateError, Geometry, LfsBlockDevice, SdHost, geometry::lookahead_for, lfs_status,
};
use crate::infrastructure::{BusLock, with_timeout};

/// SD/MMC sector size.
pub const SD_BLOCK_SIZE: u32 = 512;

/// Configuration for [`SdBlockDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SdConfig {
    /// Create a [`BusLock`] behind `lock`/`unlock`.
    pub thread_safe: bool,
    /// Give up on a transfer after this long; `None` waits forever.
    pub transfer_timeout_ms: Option<u32>,
    /// Wait budget for `lock`.
    pub lock_timeout_ms: u32,
}

impl SdConfig {
    /// Default configuration: no lock, unbounded transfers.
    pub const fn new() -> Self {
        Self {
            thread_safe: false,
            transfer_timeout_ms: None,
            lock_timeout_ms: super::spi_flash::DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    /// Enable the `lock`/`unlock` token.
    pub const fn thread_safe(mut self) -> Self {
        self.thread_safe = true;
        self
    }

    /// Abandon transfers that take longer than `timeout_ms`.
    pub const fn with_transfer_timeout(mut self, timeout_ms: u32) -> Self {
        self.transfer_timeout_ms = Some(timeout_ms);
        self
    }
}

impl Default for SdConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// littlefs block device on an SD host driver.
pub struct SdBlockDevice<H, T> {
    host: Mutex<H>,
    timer: T,
    config: SdConfig,
    geometry: Geometry,
    lock: Option<BusLock>,
}

impl<H, T> SdBlockDevice<H, T>
where
    H: SdHost,
    T: DelayNs + Clone,
{
    /// Create an adapter for the card currently in the slot.
    ///
    /// # Errors
    ///
    /// - [`CreateError::Driver`] if the host cannot report the card size
    /// - [`CreateError::Geometry`] if the card reports no sectors
    pub fn create(host: H, config: SdConfig, timer: T) -> Result<Self, CreateError<H::Error>> {
        let block_count = host.block_count().map_err(|e| {
            warn!("sd_bd: card size query failed");
            CreateError::Driver(e)
        })?;
        trace!("sd_bd: create({} sectors)", block_count);

        let geometry = Geometry {
            read_size: SD_BLOCK_SIZE,
            prog_size: SD_BLOCK_SIZE,
            block_size: SD_BLOCK_SIZE,
            block_count,
            cache_size: SD_BLOCK_SIZE,
            lookahead_size: lookahead_for(block_count),
            block_cycles: None,
        };
        geometry.validate()?;

        debug!("sd_bd: card with {} sectors", block_count);

        Ok(Self {
            host: Mutex::new(host),
            timer,
            config,
            geometry,
            lock: if config.thread_safe { Some(BusLock::new()) } else { None },
        })
    }

    /// Erase one card sector.
    ///
    /// Not reached through [`LfsBlockDevice::erase`], which is a no-op on
    /// cards.
    pub async fn erase_sector(&self, block: u32) -> Result<(), BdError> {
        trace!("sd_bd: erase_sector(block={:#x})", block);
        self.check_access(block, 0, 0);

        let result = self.host.lock().await.erase(block, 1).await;
        let result = collapse("erase", block, result);

        trace!("sd_bd: erase_sector -> {}", lfs_status(result));
        result
    }
}

impl<H, T> SdBlockDevice<H, T> {
    /// The configuration the adapter was created with.
    pub fn config(&self) -> &SdConfig {
        &self.config
    }

    /// Tear the adapter down and hand the host driver back.
    pub fn destroy(self) -> H {
        trace!("sd_bd: destroy");
        self.host.into_inner()
    }

    /// Panic unless the access honours the filesystem contract.
    fn check_access(&self, block: u32, offset: u32, len: usize) {
        assert!(
            block < self.geometry.block_count,
            "block {} out of range ({} blocks)",
            block,
            self.geometry.block_count
        );
        assert!(
            offset % SD_BLOCK_SIZE == 0,
            "offset {} is not a multiple of {}",
            offset,
            SD_BLOCK_SIZE
        );
        assert!(
            len % SD_BLOCK_SIZE as usize == 0,
            "length {} is not a multiple of {}",
            len,
            SD_BLOCK_SIZE
        );
        let end = block as u64 * SD_BLOCK_SIZE as u64 + offset as u64 + len as u64;
        assert!(
            end <= self.geometry.total_size(),
            "access of {} bytes at block {} offset {} runs past the card",
            len,
            block,
            offset
        );
    }
}

fn collapse<E>(op: &str, sector: u32, result: Result<(), E>) -> Result<(), BdError> {
    result.map_err(|_| {
        warn!("sd_bd: {} failed at sector {}", op, sector);
        BdError
    })
}

impl<H, T> LfsBlockDevice for SdBlockDevice<H, T>
where
    H: SdHost,
    T: DelayNs + Clone,
{
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    async fn read(&self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), BdError> {
        trace!("sd_bd: read(block={:#x}, off={}, len={})", block, offset, buf.len());
        self.check_access(block, offset, buf.len());

        let sector = block + offset / SD_BLOCK_SIZE;
        let mut host = self.host.lock().await;

        let result = match self.config.transfer_timeout_ms {
            None => collapse("read", sector, host.read_blocks(sector, buf).await),
            Some(timeout_ms) => {
                let mut timer = self.timer.clone();
                let outcome = with_timeout(&mut timer, timeout_ms, host.read_blocks(sector, buf)).await;
                match outcome {
                    Ok(status) => collapse("read", sector, status),
                    Err(_) => {
                        warn!("sd_bd: read at sector {} timed out after {} ms", sector, timeout_ms);
                        if host.abort_transfer().is_err() {
                            error!("sd_bd: abort after timeout failed");
                        }
                        Err(BdError)
                    }
                }
            }
        };

        trace!("sd_bd: read -> {}", lfs_status(result));
        result
    }

    async fn prog(&self, block: u32, offset: u32, data: &[u8]) -> Result<(), BdError> {
        trace!("sd_bd: prog(block={:#x}, off={}, len={})", block, offset, data.len());
        self.check_access(block, offset, data.len());

        let sector = block + offset / SD_BLOCK_SIZE;
        let mut host = self.host.lock().await;

        let result = match self.config.transfer_timeout_ms {
            None => collapse("prog", sector, host.write_blocks(sector, data).await),
            Some(timeout_ms) => {
                let mut timer = self.timer.clone();
                let outcome = with_timeout(&mut timer, timeout_ms, host.write_blocks(sector, data)).await;
                match outcome {
                    Ok(status) => collapse("prog", sector, status),
                    Err(_) => {
                        warn!("sd_bd: prog at sector {} timed out after {} ms", sector, timeout_ms);
                        if host.abort_transfer().is_err() {
                            error!("sd_bd: abort after timeout failed");
                        }
                        Err(BdError)
                    }
                }
            }
        };

        trace!("sd_bd: prog -> {}", lfs_status(result));
        result
    }

    async fn erase(&self, block: u32) -> Result<(), BdError> {
        // The card's FTL handles erase-before-write
        trace!("sd_bd: erase(block={:#x}) -> 0", block);
        Ok(())
    }

    async fn sync(&self) -> Result<(), BdError> {
        trace!("sd_bd: sync -> 0");
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
                warn!("sd_bd: lock failed: {}", e);
                BdError
            })
    }

    async fn unlock(&self) -> Result<(), BdError> {
        let Some(lock) = &self.lock else {
            return Ok(());
        };
        lock.release().map_err(|e| {
            warn!("sd_bd: unlock failed: {}", e);
            BdError
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GeometryError;
    use crate::testing::{MockHost, Op, TokioDelay};

    fn adapter(config: SdConfig) -> SdBlockDevice<MockHost, TokioDelay> {
        SdBlockDevice::create(MockHost::new(128), config, TokioDelay).unwrap()
    }

    #[test]
    fn test_geometry() {
        let bd = adapter(SdConfig::default());
        let geometry = bd.geometry();

        assert_eq!(geometry.read_size, 512);
        assert_eq!(geometry.prog_size, 512);
        assert_eq!(geometry.block_size, 512);
        assert_eq!(geometry.cache_size, 512);
        assert_eq!(geometry.block_count, 128);
        assert_eq!(geometry.lookahead_size, 16);
        assert_eq!(geometry.block_cycles, None);
        assert_eq!(geometry.block_cycles_raw(), -1);
    }

    #[test]
    fn test_create_without_card() {
        let mut host = MockHost::new(128);
        host.absent = true;
        let result = SdBlockDevice::create(host, SdConfig::default(), TokioDelay);
        assert!(matches!(result, Err(CreateError::Driver(_))));
    }

    #[test]
    fn test_create_empty_card() {
        let result = SdBlockDevice::create(MockHost::new(0), SdConfig::default(), TokioDelay);
        assert!(matches!(result, Err(CreateError::Geometry(GeometryError::NoBlocks))));
    }

    #[tokio::test]
    async fn test_sector_translation() {
        let bd = adapter(SdConfig::default());

        let mut buf = [0u8; 1024];
        bd.read(4, 0, &mut buf).await.unwrap();
        bd.prog(9, 0, &[0xAB; 512]).await.unwrap();

        let host = bd.destroy();
        assert_eq!(
            host.ops,
            vec![
                Op::ReadAsync { address: 4, len: 1024 },
                Op::Write { address: 9, len: 512 },
            ]
        );
        assert_eq!(host.sectors[9], [0xAB; 512]);
    }

    #[tokio::test]
    async fn test_multi_sector_round_trip() {
        let bd = adapter(SdConfig::default());
        let data: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();

        bd.prog(10, 0, &data).await.unwrap();

        let mut read_back = vec![0u8; 2048];
        bd.read(10, 0, &mut read_back).await.unwrap();
        assert_eq!(read_back, data);
    }

    #[tokio::test]
    async fn test_erase_hook_is_noop() {
        let bd = adapter(SdConfig::default());
        bd.prog(3, 0, &[0x55; 512]).await.unwrap();
        assert_eq!(bd.erase(3).await, Ok(()));

        let host = bd.destroy();
        assert!(!host.ops.iter().any(|op| matches!(op, Op::Erase { .. })));
        assert_eq!(host.sectors[3], [0x55; 512]);
    }

    #[tokio::test]
    async fn test_erase_hook_ignores_block() {
        let bd = adapter(SdConfig::default());
        assert_eq!(bd.erase(128).await, Ok(()));
        assert_eq!(bd.erase(u32::MAX).await, Ok(()));
        assert!(bd.destroy().ops.is_empty());
    }

    #[tokio::test]
    async fn test_erase_sector() {
        let bd = adapter(SdConfig::default());
        bd.prog(7, 0, &[0x55; 512]).await.unwrap();
        bd.erase_sector(7).await.unwrap();

        let host = bd.destroy();
        assert_eq!(host.ops.last(), Some(&Op::Erase { address: 7, len: 1 }));
        assert_eq!(host.sectors[7], [0u8; 512]);
    }

    #[tokio::test]
    async fn test_host_failure_collapses() {
        let mut host = MockHost::new(128);
        host.fail = true;
        let bd = SdBlockDevice::create(host, SdConfig::default(), TokioDelay).unwrap();

        let mut buf = [0u8; 512];
        assert_eq!(lfs_status(bd.read(0, 0, &mut buf).await), -1);
        assert_eq!(lfs_status(bd.prog(0, 0, &buf).await), -1);
        assert_eq!(lfs_status(bd.erase_sector(0).await), -1);
        assert_eq!(lfs_status(bd.erase(0).await), 0);
    }

    #[tokio::test]
    async fn test_transfer_timeout_aborts() {
        let mut host = MockHost::new(128);
        host.stall = true;
        let bd = SdBlockDevice::create(host, SdConfig::default().with_transfer_timeout(10), TokioDelay)
            .unwrap();

        let mut buf = [0u8; 512];
        assert_eq!(bd.read(0, 0, &mut buf).await, Err(BdError));
        assert_eq!(bd.destroy().ops.last(), Some(&Op::Abort));
    }

    #[tokio::test]
    async fn test_lock_unlock() {
        let bd = adapter(SdConfig {
            lock_timeout_ms: 10,
            ..SdConfig::default().thread_safe()
        });
        assert!(bd.is_thread_safe());

        bd.lock().await.unwrap();
        assert_eq!(bd.lock().await, Err(BdError));
        bd.unlock().await.unwrap();
        assert_eq!(bd.unlock().await, Err(BdError));
    }

    #[tokio::test]
    #[should_panic(expected = "not a multiple of 512")]
    async fn test_partial_sector_read() {
        let bd = adapter(SdConfig::default());
        let mut buf = [0u8; 100];
        let _ = bd.read(0, 0, &mut buf).await;
    }

    #[tokio::test]
    #[should_panic(expected = "not a multiple of 512")]
    async fn test_misaligned_offset_read() {
        let bd = adapter(SdConfig::default());
        let mut buf = [0u8; 512];
        let _ = bd.read(0, 100, &mut buf).await;
    }

    #[tokio::test]
    #[should_panic(expected = "runs past the card")]
    async fn test_read_past_card_end() {
        let bd = adapter(SdConfig::default());
        let mut buf = [0u8; 1024];
        let _ = bd.read(127, 0, &mut buf).await;
    }

    #[tokio::test]
    #[should_panic(expected = "out of range")]
    async fn test_sector_out_of_range() {
        let bd = adapter(SdConfig::default());
        let _ = bd.erase_sector(128).await;
    }
}
