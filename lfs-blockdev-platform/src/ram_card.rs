//! SD card simulated in RAM.

use std::fmt;
use std::sync::Arc;

use lfs_blockdev::{SD_BLOCK_SIZE, SdHost, TransferSignal};

use crate::irq;
use crate::probe::Probe;

const SECTOR: usize = SD_BLOCK_SIZE as usize;

/// Errors reported by [`RamCard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamCardError {
    /// No card in the slot.
    NoCard,
    /// The transfer runs past the last sector.
    OutOfRange {
        /// First sector of the transfer.
        block: u32,
        /// Number of sectors.
        count: u32,
    },
    /// The buffer is not a whole number of sectors.
    PartialSector {
        /// Buffer length.
        len: usize,
    },
    /// Failure requested through [`Probe::fail_next`].
    Injected,
}

impl fmt::Display for RamCardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCard => write!(f, "No card present"),
            Self::OutOfRange { block, count } => {
                write!(f, "Sectors {}..{} are past the end of the card", block, block + count)
            }
            Self::PartialSector { len } => write!(f, "Buffer of {} bytes is not whole sectors", len),
            Self::Injected => write!(f, "Injected card failure"),
        }
    }
}

impl std::error::Error for RamCardError {}

/// In-memory [`SdHost`] with interrupt-completed transfers.
pub struct RamCard {
    data: Vec<u8>,
    irq: Arc<TransferSignal<RamCardError>>,
    probe: Probe,
}

impl RamCard {
    /// Create a zeroed card of `block_count` sectors.
    pub fn new(block_count: u32) -> Self {
        Self::from_image(vec![0; block_count as usize * SECTOR])
    }

    /// Wrap an existing card image. A trailing partial sector is not visible.
    pub fn from_image(image: Vec<u8>) -> Self {
        log::debug!("ram_card: {} sectors", image.len() / SECTOR);
        Self {
            data: image,
            irq: Arc::new(TransferSignal::new()),
            probe: Probe::default(),
        }
    }

    /// Fault injection handle shared with this card.
    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }

    /// Current card contents.
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Consume the card and return its contents.
    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    fn sectors(&self) -> u32 {
        (self.data.len() / SECTOR) as u32
    }

    fn span(&self, block: u32, len: usize) -> Result<std::ops::Range<usize>, RamCardError> {
        self.probe.record_access();
        if self.probe.is_removed() {
            return Err(RamCardError::NoCard);
        }
        if self.probe.take_failure() {
            log::warn!("ram_card: injected failure");
            return Err(RamCardError::Injected);
        }
        if len % SECTOR != 0 {
            return Err(RamCardError::PartialSector { len });
        }
        let count = (len / SECTOR) as u32;
        if block as u64 + count as u64 > self.sectors() as u64 {
            return Err(RamCardError::OutOfRange { block, count });
        }
        let start = block as usize * SECTOR;
        Ok(start..start + len)
    }
}

impl SdHost for RamCard {
    type Error = RamCardError;

    fn block_count(&self) -> Result<u32, RamCardError> {
        if self.probe.is_removed() {
            return Err(RamCardError::NoCard);
        }
        Ok(self.sectors())
    }

    async fn read_blocks(&mut self, block: u32, buf: &mut [u8]) -> Result<(), RamCardError> {
        log::trace!("ram_card: read {}+{}", block, buf.len() / SECTOR);
        let status = self.span(block, buf.len()).map(|range| buf.copy_from_slice(&self.data[range]));
        irq::complete(&self.irq, &self.probe, status).await
    }

    async fn write_blocks(&mut self, block: u32, data: &[u8]) -> Result<(), RamCardError> {
        log::trace!("ram_card: write {}+{}", block, data.len() / SECTOR);
        let status = self
            .span(block, data.len())
            .map(|range| self.data[range].copy_from_slice(data));
        irq::complete(&self.irq, &self.probe, status).await
    }

    async fn erase(&mut self, block: u32, count: u32) -> Result<(), RamCardError> {
        log::trace!("ram_card: erase {}+{}", block, count);
        let status = self
            .span(block, count as usize * SECTOR)
            .map(|range| self.data[range].fill(0));
        irq::complete(&self.irq, &self.probe, status).await
    }

    fn abort_transfer(&mut self) -> Result<(), RamCardError> {
        log::debug!("ram_card: transfer aborted");
        self.probe.record_abort();
        self.irq.reset();
        Ok(())
    }
}
