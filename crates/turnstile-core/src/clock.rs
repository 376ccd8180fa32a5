//! Time source for window and expiry math.
//!
//! All engine arithmetic runs on [`Instant`]. Production code uses
//! [`SystemClock`]; tests and scenario replay drive a [`ManualClock`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Stand-in horizon for deadlines that `Instant` cannot represent.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `base + by`, capped at [`FAR_FUTURE`] past `base` when the sum overflows.
pub(crate) fn saturating_add(base: Instant, by: Duration) -> Instant {
    base.checked_add(by)
        .or_else(|| base.checked_add(by.min(FAR_FUTURE)))
        .unwrap_or(base)
}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Reads `Instant::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying offset, so a test can keep one handle and
/// give another to the engine.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset = offset.saturating_add(by);
    }

    /// Jump to `at` past the origin. Moving backwards is ignored.
    pub fn set_elapsed(&self, at: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        if at > *offset {
            *offset = at;
        }
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        saturating_add(self.origin, self.elapsed())
    }
}
