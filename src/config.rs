//! Session tuning knobs.

use std::time::Duration;

use crate::error::{Error, Result};

/// Interval of the fallback poll timer.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Upper bound on the number of bytes read per reconciliation pass.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Options shared by every pass of a single session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TailOptions {
    /// How often reconciliation runs regardless of change notifications.
    pub poll_interval: Duration,
    /// Size of the read buffer. A line longer than this is emitted as
    /// [`TailEvent::Partial`](crate::TailEvent::Partial) chunks instead.
    pub chunk_size: usize,
}

impl TailOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidOption("poll_interval must be non-zero"));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidOption("chunk_size must be non-zero"));
        }
        Ok(())
    }
}

impl Default for TailOptions {
    fn default() -> Self {
        TailOptions {
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
