//! Delay injection for everything the dispatcher stalls on.
//!
//! Four things make a request wait: the bucket's reset window, a 429 replay,
//! the global latch, and the sweeper cadence between passes. All of them go
//! through the [`Sleeper`] trait instead of touching the timer directly, so
//! tests can collapse the waits to nothing and still assert the exact
//! durations the dispatcher asked for.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

/// A delay the dispatcher can await.
///
/// Implementations must be cheap to call concurrently and must resolve
/// eventually; a bucket's serial queue stays blocked while one is pending.
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

/// The production delay, backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Never waits. Collapses every stall to a no-op so rate-limit scenarios run
/// as straight-line code under test.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

#[derive(Debug, Default)]
struct WaitLog {
    waits: Vec<Duration>,
    total: Duration,
}

/// Never waits, but keeps a ledger of every wait that was requested.
///
/// The seed timings are exact (a Cloudflare-framed 429 with `Retry-After: 1`
/// must stall 1000 ms plus the offset), so the ledger answers pointed
/// questions — how many waits, their running total, whether a specific
/// duration ever came through — and hands out a borrow of the raw list only
/// through `with_waits` for anything richer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    log: Arc<Mutex<WaitLog>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many waits have been requested.
    pub fn wait_count(&self) -> usize {
        self.log.lock().unwrap().waits.len()
    }

    /// Running sum of every requested wait.
    pub fn total_waited(&self) -> Duration {
        self.log.lock().unwrap().total
    }

    /// Whether a wait of exactly `duration` was requested at some point.
    pub fn waited_for(&self, duration: Duration) -> bool {
        self.log.lock().unwrap().waits.contains(&duration)
    }

    /// Inspect the ledger in request order without copying it out.
    pub fn with_waits<R>(&self, inspect: impl FnOnce(&[Duration]) -> R) -> R {
        inspect(&self.log.lock().unwrap().waits)
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        let mut log = self.log.lock().unwrap();
        log.waits.clear();
        log.total = Duration::ZERO;
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let mut log = self.log.lock().unwrap();
        log.waits.push(duration);
        log.total += duration;
    }
}
