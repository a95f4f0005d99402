//! LfsBlockDevice port - the callback record a littlefs-style core consumes.
//!
//! littlefs expects a configuration record of function pointers (`read`,
//! `prog`, `erase`, `sync`, optionally `lock`/`unlock`), geometry constants
//! and an opaque context pointer. In Rust the record is this trait: the
//! adapter is the context, the methods are the callbacks and [`Geometry`]
//! carries the constants.
//!
//! ```text
//! ┌─────────────────────┐
//! │  Filesystem core    │
//! └──────────┬──────────┘
//!            │ calls
//!            ▼
//! ┌─────────────────────┐
//! │  LfsBlockDevice     │  ◄── This trait
//! └──────────┬──────────┘
//!            │ implemented by
//!            ▼
//! ┌─────────────────────┐
//! │ SpiFlashBlockDevice │
//! │ SdBlockDevice       │
//! └─────────────────────┘
//! ```

use crate::domain::{error::BdError, geometry::Geometry};

/// Block device as seen by the filesystem.
///
/// # Contract
///
/// Callers must pass `block < geometry().block_count`, offsets and lengths
/// that are multiples of `read_size` (reads) or `prog_size` (programs), and
/// ranges that end inside the device. Violations are programming errors and
/// panic; they are never reported as [`BdError`].
///
/// Runtime failures (bus errors, timeouts, missing card) all surface as the
/// same [`BdError`]. Use [`lfs_status`](crate::lfs_status) to turn a result
/// into the `0` / `-1` littlefs convention.
///
/// # Examples
///
/// ```ignore
/// async fn copy_block<B: LfsBlockDevice>(bd: &B, from: u32, to: u32, buf: &mut [u8]) -> Result<(), BdError> {
///     bd.lock().await?;
///     bd.read(from, 0, buf).await?;
///     bd.erase(to).await?;
///     bd.prog(to, 0, buf).await?;
///     bd.unlock().await
/// }
/// ```
pub trait LfsBlockDevice {
    /// Geometry fixed at creation.
    fn geometry(&self) -> &Geometry;

    /// Read `buf.len()` bytes from `offset` within `block`.
    async fn read(&self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), BdError>;

    /// Program `data` at `offset` within `block`.
    ///
    /// The range must have been erased first where the medium requires it.
    async fn prog(&self, block: u32, offset: u32, data: &[u8]) -> Result<(), BdError>;

    /// Erase `block`.
    async fn erase(&self, block: u32) -> Result<(), BdError>;

    /// Flush any device-side write cache.
    async fn sync(&self) -> Result<(), BdError>;

    /// Whether [`lock`](Self::lock) / [`unlock`](Self::unlock) guard anything.
    ///
    /// Mirrors whether littlefs would be given lock callbacks at all.
    fn is_thread_safe(&self) -> bool {
        false
    }

    /// Acquire the adapter-wide lock before a sequence that must look atomic.
    async fn lock(&self) -> Result<(), BdError> {
        Ok(())
    }

    /// Release the lock taken by [`lock`](Self::lock).
    async fn unlock(&self) -> Result<(), BdError> {
        Ok(())
    }
}
