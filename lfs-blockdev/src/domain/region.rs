//! Byte window on a NOR flash device.

use core::fmt;

/// A contiguous byte range of a larger device made visible to the filesystem.
///
/// Used on devices whose sector layout is not uniform (hybrid parts with a
/// block of small parameter sectors) or that share the flash with firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Region {
    /// First byte of the window.
    pub start: u32,
    /// Size of the window in bytes.
    pub size: u32,
}

impl Region {
    /// Create a region window.
    ///
    /// # Examples
    ///
    /// ```
    /// use lfs_blockdev::Region;
    ///
    /// let region = Region::new(0x10_0000, 0x4_0000);
    /// assert_eq!(region.end(), Some(0x14_0000));
    /// ```
    #[inline]
    pub const fn new(start: u32, size: u32) -> Self {
        Self { start, size }
    }

    /// Window spanning a whole device of `device_size` bytes.
    #[inline]
    pub const fn whole(device_size: u32) -> Self {
        Self::new(0, device_size)
    }

    /// One past the last byte, or `None` if the window wraps the address space.
    #[inline]
    pub const fn end(&self) -> Option<u32> {
        self.start.checked_add(self.size)
    }

    /// Whether the window lies inside a device of `device_size` bytes.
    #[inline]
    pub const fn fits_in(&self, device_size: u32) -> bool {
        match self.end() {
            Some(end) => end <= device_size,
            None => false,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region({:#x}+{:#x})", self.start, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_end() {
        assert_eq!(Region::new(0x1000, 0x1000).end(), Some(0x2000));
        assert_eq!(Region::new(u32::MAX, 2).end(), None);
    }

    #[test]
    fn test_region_fits() {
        let region = Region::new(0x3C_0000, 0x4_0000);
        assert!(region.fits_in(0x40_0000));
        assert!(!region.fits_in(0x3F_FFFF));
        assert!(Region::whole(0x1000).fits_in(0x1000));
        assert!(!Region::new(u32::MAX, 2).fits_in(u32::MAX));
    }

    #[test]
    fn test_region_display() {
        assert_eq!(format!("{}", Region::new(0x1000, 0x200)), "Region(0x1000+0x200)");
    }
}
