//! Per-bucket request handler: the serialization and retry core.
//!
//! One handler exists per `bucket hash : major parameter` pair. It admits one
//! request at a time through a fair FIFO, honors the global latch and its own
//! reset window before sending, and interprets every response's rate-limit
//! headers inside a single critical section.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::RestError;
use crate::events::{RatelimitInfo, RestEvent};
use crate::manager::RestShared;
use crate::request::AssembledRequest;
use crate::response::ResponseBody;
use crate::routes::RouteIdentifier;
use crate::transport::WireResponse;

/// Rate-limit window state learned from response headers.
///
/// Defaults are deliberately permissive: an unknown bucket must never block
/// its own first request, so `limit` starts unbounded, `remaining` starts at
/// one token, and `reset_at` starts in the past.
#[derive(Debug, Clone, Copy)]
struct BucketState {
    limit: u64,
    remaining: u64,
    reset_at: i64,
}

impl Default for BucketState {
    fn default() -> Self {
        Self { limit: u64::MAX, remaining: 1, reset_at: -1 }
    }
}

impl BucketState {
    fn limited(&self, now_millis: u64) -> bool {
        self.remaining == 0 && (now_millis as i64) < self.reset_at
    }

    fn time_to_reset(&self, now_millis: u64) -> Duration {
        Duration::from_millis(self.reset_at.saturating_sub(now_millis as i64).max(0) as u64)
    }
}

/// Read-only view of a handler, for observability and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub hash: String,
    pub major_parameter: String,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: i64,
    pub pending: usize,
    pub limited: bool,
}

/// What one response's headers told us beyond the window state.
struct HeaderVerdict {
    retry_after: Duration,
    is_global: bool,
    migrated: Option<(String, String)>,
}

/// Decrements the pending counter on every exit path.
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn register(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The per-bucket queue and request state machine.
///
/// The handler's `hash` never changes: when the server reports a different
/// bucket hash, the manager's hash table is updated and *future* requests land
/// on another handler, while this one drains and is eventually swept.
pub struct BucketHandler {
    id: String,
    hash: String,
    major_parameter: String,
    state: Mutex<BucketState>,
    serial: tokio::sync::Mutex<()>,
    pending: AtomicUsize,
}

impl BucketHandler {
    pub(crate) fn new(hash: String, major_parameter: String) -> Self {
        Self {
            id: format!("{hash}:{major_parameter}"),
            hash,
            major_parameter,
            state: Mutex::new(BucketState::default()),
            serial: tokio::sync::Mutex::new(()),
            pending: AtomicUsize::new(0),
        }
    }

    /// Queue key: `hash:major_parameter`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// True when nothing is queued or in flight and the window is open; the
    /// sweeper only ever removes inactive handlers.
    pub fn inactive(&self, now_millis: u64) -> bool {
        self.pending.load(Ordering::SeqCst) == 0 && !self.state.lock().unwrap().limited(now_millis)
    }

    pub fn snapshot(&self, now_millis: u64) -> BucketSnapshot {
        let state = *self.state.lock().unwrap();
        BucketSnapshot {
            hash: self.hash.clone(),
            major_parameter: self.major_parameter.clone(),
            limit: state.limit,
            remaining: state.remaining,
            reset_at: state.reset_at,
            pending: self.pending.load(Ordering::SeqCst),
            limited: state.limited(now_millis),
        }
    }

    /// If the window is exhausted, how long to stall and the window's limit.
    fn stall(&self, now_millis: u64) -> Option<(Duration, u64)> {
        let state = self.state.lock().unwrap();
        if state.limited(now_millis) {
            Some((state.time_to_reset(now_millis), state.limit))
        } else {
            None
        }
    }

    /// Run one request through this bucket.
    ///
    /// Admission is strictly FIFO (`tokio::sync::Mutex` queues waiters
    /// fairly), and the lock is held until the request finishes, so at most
    /// one request per bucket is ever in flight. The lock and the pending
    /// counter release by drop on every exit path.
    pub(crate) async fn push(
        &self,
        shared: &Arc<RestShared>,
        route: &RouteIdentifier,
        request: AssembledRequest,
    ) -> Result<ResponseBody, RestError> {
        let _pending = PendingGuard::register(&self.pending);
        let _turn = self.serial.lock().await;

        while let Some(barrier) = shared.global.current() {
            barrier.await;
        }

        if let Some((wait, limit)) = self.stall(shared.clock.now_millis()) {
            shared
                .emit(RestEvent::Ratelimited(RatelimitInfo {
                    time_to_reset: wait,
                    limit,
                    method: request.method.to_string(),
                    hash: self.hash.clone(),
                    route: route.route.clone(),
                    major_parameter: self.major_parameter.clone(),
                }))
                .await;
            shared.sleeper.sleep(wait).await;
        }

        self.make_request(shared, route, request).await
    }

    /// Send/classify loop. Aborted and 5xx attempts share one bounded retry
    /// counter; 429 replays never touch it because they are not our fault.
    async fn make_request(
        &self,
        shared: &Arc<RestShared>,
        route: &RouteIdentifier,
        request: AssembledRequest,
    ) -> Result<ResponseBody, RestError> {
        let mut retries: u32 = 0;
        loop {
            let outcome =
                tokio::time::timeout(shared.options.timeout, shared.transport.send(&request))
                    .await;
            let response = match outcome {
                Err(_) => {
                    if retries < shared.options.retries {
                        retries += 1;
                        continue;
                    }
                    return Err(RestError::Timeout {
                        timeout: shared.options.timeout,
                        method: request.method.clone(),
                        url: request.url.clone(),
                    });
                }
                Ok(Err(transport_error)) => return Err(transport_error),
                Ok(Ok(response)) => response,
            };

            let verdict = self.interpret(shared, route, &request, &response);
            if let Some((old, new)) = &verdict.migrated {
                shared
                    .emit(RestEvent::Debug(format!(
                        "Received bucket hash update: {old} => {new} for {} {}",
                        request.method, route.route
                    )))
                    .await;
            }
            if verdict.is_global {
                shared.global.clone().install(verdict.retry_after, shared.sleeper.clone());
            }

            match response.status {
                200..=299 => {
                    return ResponseBody::parse(response.get_header("content-type"), &response.body)
                }
                429 => {
                    shared
                        .emit(RestEvent::Debug(format!(
                            "Hit a 429 on bucket {}; retrying after {}ms",
                            self.id,
                            verdict.retry_after.as_millis()
                        )))
                        .await;
                    shared.sleeper.sleep(verdict.retry_after).await;
                    continue;
                }
                500..=599 => {
                    if retries < shared.options.retries {
                        retries += 1;
                        continue;
                    }
                    return Err(RestError::Http {
                        status: response.status,
                        status_text: response.status_text().to_string(),
                        method: request.method.clone(),
                        url: request.url.clone(),
                    });
                }
                400..=499 => return Err(api_error(&request, &response)),
                _ => return Ok(ResponseBody::None),
            }
        }
    }

    /// Interpret one response's rate-limit headers.
    ///
    /// The window fields are written under a single state lock so concurrent
    /// `limited` reads never observe `remaining = 0` with a stale reset.
    /// When `Reset-After` is absent the reset collapses to now, without
    /// offset, leaving a fully-drained bucket unlimited until the server says
    /// otherwise.
    fn interpret(
        &self,
        shared: &Arc<RestShared>,
        route: &RouteIdentifier,
        request: &AssembledRequest,
        response: &WireResponse,
    ) -> HeaderVerdict {
        let now = shared.clock.now_millis();
        let offset = shared.options.offset;

        let limit = response
            .get_header("x-ratelimit-limit")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(u64::MAX);
        let remaining = response
            .get_header("x-ratelimit-remaining")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1);
        let reset_at = match response
            .get_header("x-ratelimit-reset-after")
            .and_then(|v| v.parse::<f64>().ok())
        {
            Some(seconds) => now as i64 + (seconds * 1000.0) as i64 + offset as i64,
            None => now as i64,
        };
        {
            let mut state = self.state.lock().unwrap();
            state.limit = limit;
            state.remaining = remaining;
            state.reset_at = reset_at;
        }

        let mut migrated = None;
        if let Some(bucket_hash) = response.get_header("x-ratelimit-bucket") {
            if bucket_hash != self.hash {
                shared.hashes.lock().unwrap().insert(
                    format!("{}-{}", request.method, route.route),
                    bucket_hash.to_string(),
                );
                migrated = Some((self.hash.clone(), bucket_hash.to_string()));
            }
        }

        // Retry-After is seconds from Cloudflare's edge (no Via header) and
        // milliseconds from the API itself.
        let retry_after = response
            .get_header("retry-after")
            .and_then(|v| v.parse::<f64>().ok())
            .map(|value| {
                let millis = if response.get_header("via").is_none() {
                    value * 1000.0
                } else {
                    value
                };
                Duration::from_millis(millis as u64 + offset)
            })
            .unwrap_or(Duration::ZERO);

        HeaderVerdict {
            retry_after,
            is_global: response.get_header("x-ratelimit-global").is_some(),
            migrated,
        }
    }
}

fn api_error(request: &AssembledRequest, response: &WireResponse) -> RestError {
    let decoded = ResponseBody::parse(response.get_header("content-type"), &response.body).ok();
    let json = decoded.as_ref().and_then(ResponseBody::json);
    RestError::Api {
        message: json
            .and_then(|v| v.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or_else(|| response.status_text())
            .to_string(),
        code: json.and_then(|v| v.get("code")).and_then(|c| c.as_u64()).unwrap_or(0),
        status: response.status,
        method: request.method.clone(),
        url: request.url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handler_is_not_limited() {
        let handler = BucketHandler::new("abc".into(), "42".into());
        let snap = handler.snapshot(1_000);
        assert_eq!(snap.limit, u64::MAX);
        assert_eq!(snap.remaining, 1);
        assert_eq!(snap.reset_at, -1);
        assert!(!snap.limited);
        assert!(handler.stall(1_000).is_none());
    }

    #[test]
    fn drained_window_limits_until_reset_passes() {
        let handler = BucketHandler::new("abc".into(), "42".into());
        {
            let mut state = handler.state.lock().unwrap();
            state.limit = 5;
            state.remaining = 0;
            state.reset_at = 3_000;
        }
        let (wait, limit) = handler.stall(1_000).expect("should be limited");
        assert_eq!(wait, Duration::from_millis(2_000));
        assert_eq!(limit, 5);
        assert!(handler.stall(3_000).is_none());
        assert!(handler.stall(5_000).is_none());
    }

    #[test]
    fn drained_window_with_past_reset_is_open() {
        let handler = BucketHandler::new("abc".into(), "42".into());
        {
            let mut state = handler.state.lock().unwrap();
            state.remaining = 0;
            state.reset_at = 500;
        }
        assert!(handler.stall(1_000).is_none());
        assert!(handler.inactive(1_000));
    }

    #[test]
    fn inactive_requires_empty_queue_and_open_window() {
        let handler = BucketHandler::new("abc".into(), "42".into());
        assert!(handler.inactive(0));

        let guard = PendingGuard::register(&handler.pending);
        assert!(!handler.inactive(0));
        drop(guard);
        assert!(handler.inactive(0));

        {
            let mut state = handler.state.lock().unwrap();
            state.remaining = 0;
            state.reset_at = 10_000;
        }
        assert!(!handler.inactive(0));
    }

    #[test]
    fn pending_guard_releases_on_drop() {
        let counter = AtomicUsize::new(0);
        {
            let _a = PendingGuard::register(&counter);
            let _b = PendingGuard::register(&counter);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn queue_key_combines_hash_and_major() {
        let handler = BucketHandler::new("abc".into(), "42".into());
        assert_eq!(handler.id(), "abc:42");
    }
}
