//! Errors crossing the adapter boundary.
//!
//! Runtime failures carry one bit of information ([`BdError`]); only adapter
//! creation, which happens before the filesystem mounts, reports a richer
//! [`CreateError`].

use crate::domain::geometry::GeometryError;
use core::fmt;

/// littlefs success code.
pub const LFS_OK: i32 = 0;

/// littlefs generic failure code returned for every [`BdError`].
pub const LFS_ERR: i32 = -1;

/// A block device operation failed.
///
/// Driver diagnostics are deliberately not carried; they are logged at the
/// point of failure and the filesystem only learns that the call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BdError;

impl BdError {
    /// The littlefs integer for this error.
    #[inline]
    pub const fn code(self) -> i32 {
        LFS_ERR
    }
}

impl fmt::Display for BdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block device operation failed")
    }
}

impl core::error::Error for BdError {}

/// Map an adapter result onto the littlefs return convention (`0` / `-1`).
///
/// # Examples
///
/// ```
/// use lfs_blockdev::{BdError, lfs_status};
///
/// assert_eq!(lfs_status(Ok(())), 0);
/// assert_eq!(lfs_status(Err(BdError)), -1);
/// ```
#[inline]
pub fn lfs_status(result: Result<(), BdError>) -> i32 {
    match result {
        Ok(()) => LFS_OK,
        Err(e) => e.code(),
    }
}

/// Errors that can occur while creating an adapter.
#[derive(Debug)]
#[non_exhaustive]
pub enum CreateError<E> {
    /// The driver failed while being queried for geometry.
    Driver(E),

    /// The derived geometry violates a littlefs invariant.
    Geometry(GeometryError),

    /// The requested region window extends past the end of the device.
    RegionOutOfBounds {
        /// First byte of the window.
        start: u32,
        /// Requested window size.
        size: u32,
        /// Size reported by the driver.
        device_size: u32,
    },

    /// The region window does not start on an erase boundary.
    UnalignedRegion {
        /// First byte of the window.
        start: u32,
        /// Erase size reported at `start`.
        erase_size: u32,
    },
}

impl<E> From<GeometryError> for CreateError<E> {
    fn from(e: GeometryError) -> Self {
        Self::Geometry(e)
    }
}

impl<E: fmt::Debug> fmt::Display for CreateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(e) => write!(f, "Driver error: {:?}", e),
            Self::Geometry(e) => write!(f, "Invalid geometry: {}", e),
            Self::RegionOutOfBounds {
                start,
                size,
                device_size,
            } => write!(
                f,
                "Region {:#x}+{:#x} exceeds device size {:#x}",
                start, size, device_size
            ),
            Self::UnalignedRegion { start, erase_size } => write!(
                f,
                "Region start {:#x} is not aligned to erase size {:#x}",
                start, erase_size
            ),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for CreateError<E> {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Geometry(e) => Some(e),
            _ => None,
        }
    }
}
