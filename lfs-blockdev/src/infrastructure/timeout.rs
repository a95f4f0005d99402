//! Bounded waits.

use core::fmt;
use core::future::Future;
use embassy_futures::select::{Either, select};
use embedded_hal_async::delay::DelayNs;

/// The awaited operation did not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation timed out")
    }
}

impl core::error::Error for TimedOut {}

/// Race `fut` against a `timeout_ms` delay.
///
/// When the delay wins, `fut` is dropped where it stands. Whatever it was
/// driving is left for the caller to clean up.
pub async fn with_timeout<T, F>(timer: &mut T, timeout_ms: u32, fut: F) -> Result<F::Output, TimedOut>
where
    T: DelayNs,
    F: Future,
{
    match select(fut, timer.delay_ms(timeout_ms)).await {
        Either::First(output) => Ok(output),
        Either::Second(()) => Err(TimedOut),
    }
}
