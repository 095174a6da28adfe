//! Clock abstraction used by bucket handlers to evaluate reset windows.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Thread-safe time source abstraction.
///
/// Bucket reset instants are computed from server-supplied `Reset-After`
/// deltas and compared against `now_millis()` later, so the production
/// implementation must use a wall-clock origin (UNIX epoch). Calls must be
/// safe concurrently (`Send + Sync`).
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the implementer's origin.
    fn now_millis(&self) -> u64;
}

/// Wall clock backed by `SystemTime`, origin UNIX epoch.
///
/// Readings are not monotonic under NTP adjustment; reset windows derived
/// from them shift together with the adjustment, which is the behavior the
/// server's own `Reset-After` deltas assume.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Test clock that only moves when told to.
///
/// Clones share the same underlying reading, so a test can hold one handle
/// while the dispatcher under test holds another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock starting at `start_millis`.
    pub fn new(start_millis: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(start_millis)) }
    }

    /// Advance the clock by `delta_millis`.
    pub fn advance(&self, delta_millis: u64) {
        self.now.fetch_add(delta_millis, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute reading.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
