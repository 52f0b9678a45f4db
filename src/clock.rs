//! Injectable timestamp source.
//!
//! Budget windows and usage statistics depend on wall-clock time; routing
//! tests need to move time forward without sleeping. The [`Clock`] trait is
//! the seam: production code uses [`SystemClock`], tests use [`ManualClock`].

use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

/// A source of wall-clock timestamps.
///
/// Object-safe so components can hold `Arc<dyn Clock>`.
pub trait Clock: Send + Sync {
    /// Return the current wall-clock time.
    fn now(&self) -> SystemTime;
}

/// Production clock backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Test clock that only moves when told to.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tokio_backend_hub::{Clock, ManualClock};
///
/// let clock = ManualClock::default();
/// let t0 = clock.now();
/// clock.advance(Duration::from_secs(3600));
/// assert_eq!(clock.now(), t0 + Duration::from_secs(3600));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    /// Create a manual clock starting at the given instant.
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
