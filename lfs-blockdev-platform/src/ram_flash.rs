//! Serial NOR flash simulated in RAM.
//!
//! Behaves like the real array: erased bytes read `0xFF`, programming can only
//! clear bits, and erases work on whole sectors. Parts with a block of small
//! boot sectors at the bottom of the address space can be modelled with
//! [`RamFlash::with_small_sectors`].

use std::fmt;
use std::sync::Arc;

use lfs_blockdev::{SerialFlash, TransferSignal};

use crate::irq;
use crate::probe::Probe;

/// Erased byte value.
pub const ERASED: u8 = 0xFF;

/// Errors reported by [`RamFlash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamFlashError {
    /// The access runs past the end of the array.
    OutOfBounds {
        /// Start of the access.
        address: u32,
        /// Length of the access.
        len: usize,
    },
    /// An erase does not cover whole sectors.
    Unaligned {
        /// Offending address.
        address: u32,
        /// Sector size at that address.
        erase_size: u32,
    },
    /// The image does not fit the 32-bit address space.
    TooLarge {
        /// Image length in bytes.
        len: usize,
    },
    /// Failure requested through [`Probe::fail_next`].
    Injected,
}

impl fmt::Display for RamFlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { address, len } => {
                write!(f, "Access of {} bytes at {:#x} is out of bounds", len, address)
            }
            Self::Unaligned { address, erase_size } => {
                write!(f, "Erase at {:#x} is not aligned to the {} byte sector", address, erase_size)
            }
            Self::TooLarge { len } => write!(f, "Image of {} bytes exceeds 4 GiB", len),
            Self::Injected => write!(f, "Injected flash failure"),
        }
    }
}

impl std::error::Error for RamFlashError {}

#[derive(Debug, Clone, Copy)]
struct SmallSectors {
    size: u32,
    count: u32,
}

/// In-memory [`SerialFlash`] with interrupt-completed reads.
pub struct RamFlash {
    data: Vec<u8>,
    erase_size: u32,
    prog_size: u32,
    small: Option<SmallSectors>,
    irq: Arc<TransferSignal<RamFlashError>>,
    probe: Probe,
}

impl RamFlash {
    /// Create an erased array of `size` bytes.
    pub fn new(size: u32, erase_size: u32, prog_size: u32) -> Self {
        Self::wrap(vec![ERASED; size as usize], erase_size, prog_size)
    }

    /// Wrap an existing flash image. Fails if the image is not addressable
    /// with 32-bit addresses.
    pub fn from_image(image: Vec<u8>, erase_size: u32, prog_size: u32) -> Result<Self, RamFlashError> {
        addressable(image.len())?;
        Ok(Self::wrap(image, erase_size, prog_size))
    }

    fn wrap(image: Vec<u8>, erase_size: u32, prog_size: u32) -> Self {
        log::debug!(
            "ram_flash: {} bytes, sectors of {}, pages of {}",
            image.len(),
            erase_size,
            prog_size
        );
        Self {
            data: image,
            erase_size,
            prog_size,
            small: None,
            irq: Arc::new(TransferSignal::new()),
            probe: Probe::default(),
        }
    }

    /// Make the first `count` sectors `size` bytes each.
    pub fn with_small_sectors(mut self, size: u32, count: u32) -> Self {
        self.small = Some(SmallSectors { size, count });
        self
    }

    /// Fault injection handle shared with this device.
    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }

    /// Current array contents.
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Consume the device and return the array contents.
    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    fn range(&self, address: u32, len: usize) -> Result<std::ops::Range<usize>, RamFlashError> {
        let start = address as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(RamFlashError::OutOfBounds { address, len }),
        }
    }

    fn begin(&self) -> Result<(), RamFlashError> {
        self.probe.record_access();
        if self.probe.take_failure() {
            log::warn!("ram_flash: injected failure");
            return Err(RamFlashError::Injected);
        }
        Ok(())
    }
}

fn addressable(len: usize) -> Result<u32, RamFlashError> {
    // The last byte must sit at a u32 address
    match u32::try_from(len) {
        Ok(size) => Ok(size),
        Err(_) => Err(RamFlashError::TooLarge { len }),
    }
}

impl SerialFlash for RamFlash {
    type Error = RamFlashError;

    fn size(&self) -> u32 {
        // from_image bounds the length
        self.data.len() as u32
    }

    fn prog_size(&self, _address: u32) -> u32 {
        self.prog_size
    }

    fn erase_size(&self, address: u32) -> u32 {
        match self.small {
            Some(small) if address < small.size * small.count => small.size,
            _ => self.erase_size,
        }
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), RamFlashError> {
        log::trace!("ram_flash: read {:#x}+{}", address, buf.len());
        self.begin()?;
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), RamFlashError> {
        log::trace!("ram_flash: write {:#x}+{}", address, data.len());
        self.begin()?;
        let range = self.range(address, data.len())?;
        for (cell, byte) in self.data[range].iter_mut().zip(data) {
            *cell &= *byte;
        }
        Ok(())
    }

    fn erase(&mut self, address: u32, len: u32) -> Result<(), RamFlashError> {
        log::trace!("ram_flash: erase {:#x}+{}", address, len);
        self.begin()?;
        let range = self.range(address, len as usize)?;

        let end = address + len;
        let mut sector = address;
        while sector < end {
            let erase_size = self.erase_size(sector);
            if sector % erase_size != 0 || sector + erase_size > end {
                return Err(RamFlashError::Unaligned {
                    address: sector,
                    erase_size,
                });
            }
            sector += erase_size;
        }

        self.data[range].fill(ERASED);
        Ok(())
    }

    async fn read_async(&mut self, address: u32, buf: &mut [u8]) -> Result<(), RamFlashError> {
        let status = self.read(address, buf);
        irq::complete(&self.irq, &self.probe, status).await
    }

    fn abort_transfer(&mut self) -> Result<(), RamFlashError> {
        log::debug!("ram_flash: transfer aborted");
        self.probe.record_abort();
        self.irq.reset();
        Ok(())
    }
}
