//! Geometry descriptor handed to the filesystem.

use core::fmt;

/// Upper bound for the lookahead buffer, in bytes.
pub const LOOKAHEAD_SIZE_MAX: u32 = 64;

/// Filesystem-facing geometry of a block device.
///
/// Derived once from the driver at adapter creation and never changed
/// afterwards. Sizes are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Geometry {
    /// Minimum read granularity.
    pub read_size: u32,
    /// Minimum program granularity.
    pub prog_size: u32,
    /// Erase unit, the filesystem's block.
    pub block_size: u32,
    /// Number of blocks visible to the filesystem.
    pub block_count: u32,
    /// Size of each filesystem cache.
    pub cache_size: u32,
    /// Size of the block allocator's lookahead bitmap.
    pub lookahead_size: u32,
    /// Erase cycles before metadata is relocated; `None` disables wear leveling.
    pub block_cycles: Option<u32>,
}

impl Geometry {
    /// Check every invariant the filesystem relies on.
    ///
    /// # Examples
    ///
    /// ```
    /// use lfs_blockdev::Geometry;
    ///
    /// let geometry = Geometry {
    ///     read_size: 1,
    ///     prog_size: 256,
    ///     block_size: 4096,
    ///     block_count: 256,
    ///     cache_size: 256,
    ///     lookahead_size: 32,
    ///     block_cycles: Some(512),
    /// };
    /// assert!(geometry.validate().is_ok());
    /// ```
    pub const fn validate(&self) -> Result<(), GeometryError> {
        if self.block_count == 0 {
            return Err(GeometryError::NoBlocks);
        }

        if self.read_size == 0
            || self.prog_size == 0
            || self.block_size == 0
            || self.cache_size == 0
            || self.lookahead_size == 0
        {
            return Err(GeometryError::ZeroSize);
        }

        if self.lookahead_size % 8 != 0 {
            return Err(GeometryError::LookaheadNotMultipleOf8 {
                lookahead_size: self.lookahead_size,
            });
        }

        if self.cache_size % self.read_size != 0 || self.cache_size % self.prog_size != 0 {
            return Err(GeometryError::CacheNotMultipleOfIo {
                cache_size: self.cache_size,
                read_size: self.read_size,
                prog_size: self.prog_size,
            });
        }

        if self.block_size % self.cache_size != 0 {
            return Err(GeometryError::BlockNotMultipleOfCache {
                block_size: self.block_size,
                cache_size: self.cache_size,
            });
        }

        if let Some(0) = self.block_cycles {
            return Err(GeometryError::ZeroBlockCycles);
        }

        Ok(())
    }

    /// Total number of bytes visible to the filesystem.
    #[inline]
    pub const fn total_size(&self) -> u64 {
        self.block_size as u64 * self.block_count as u64
    }

    /// `block_cycles` as littlefs expects it (`-1` disables wear leveling).
    #[inline]
    pub const fn block_cycles_raw(&self) -> i32 {
        match self.block_cycles {
            Some(cycles) if cycles <= i32::MAX as u32 => cycles as i32,
            Some(_) => i32::MAX,
            None => -1,
        }
    }
}

/// Lookahead size for a device with `block_count` blocks.
///
/// One bit per block rounded up to a multiple of 8 bytes, capped at
/// [`LOOKAHEAD_SIZE_MAX`].
///
/// # Examples
///
/// ```
/// use lfs_blockdev::domain::lookahead_for;
///
/// assert_eq!(lookahead_for(1), 8);
/// assert_eq!(lookahead_for(64), 8);
/// assert_eq!(lookahead_for(65), 16);
/// assert_eq!(lookahead_for(1_000_000), 64);
/// ```
#[inline]
pub const fn lookahead_for(block_count: u32) -> u32 {
    let words = block_count.div_ceil(64);
    let size = 8u32.saturating_mul(words);
    if size < LOOKAHEAD_SIZE_MAX {
        size
    } else {
        LOOKAHEAD_SIZE_MAX
    }
}

/// Violated geometry invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GeometryError {
    /// A size field is zero.
    ZeroSize,
    /// The device exposes no complete block.
    NoBlocks,
    /// Lookahead size is not a multiple of 8.
    LookaheadNotMultipleOf8 {
        /// The offending lookahead size.
        lookahead_size: u32,
    },
    /// Cache size is not a multiple of the read and program sizes.
    CacheNotMultipleOfIo {
        /// Cache size.
        cache_size: u32,
        /// Read size.
        read_size: u32,
        /// Program size.
        prog_size: u32,
    },
    /// Block size is not a multiple of the cache size.
    BlockNotMultipleOfCache {
        /// Block size.
        block_size: u32,
        /// Cache size.
        cache_size: u32,
    },
    /// `block_cycles` of zero; use `None` to disable wear leveling.
    ZeroBlockCycles,
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSize => write!(f, "Geometry sizes cannot be zero"),
            Self::NoBlocks => write!(f, "Device exposes no complete block"),
            Self::LookaheadNotMultipleOf8 { lookahead_size } => {
                write!(f, "Lookahead size {} must be a multiple of 8", lookahead_size)
            }
            Self::CacheNotMultipleOfIo {
                cache_size,
                read_size,
                prog_size,
            } => write!(
                f,
                "Cache size {} must be a multiple of read size {} and prog size {}",
                cache_size, read_size, prog_size
            ),
            Self::BlockNotMultipleOfCache {
                block_size,
                cache_size,
            } => write!(
                f,
                "Block size {} must be a multiple of cache size {}",
                block_size, cache_size
            ),
            Self::ZeroBlockCycles => write!(f, "Block cycles cannot be zero"),
        }
    }
}

impl core::error::Error for GeometryError {}
