//! Process-wide dispatch state: learned bucket hashes, live handlers, the
//! global rate-limit latch, the credential slot, and the sweeper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use reqwest::Method;
use tokio::task::JoinHandle;
use tower::util::BoxCloneService;

use crate::bucket::{BucketHandler, BucketSnapshot};
use crate::cdn::CdnEndpoints;
use crate::clock::{Clock, WallClock};
use crate::error::RestError;
use crate::events::{emit_best_effort, EventSink, LogSink, RestEvent, SharedSink};
use crate::options::RestOptions;
use crate::request::{assemble, Request};
use crate::response::ResponseBody;
use crate::routes::RouteIdentifier;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::transport::{HttpTransport, ReqwestTransport};

/// How often inactive handlers are collected.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

type Barrier = Shared<BoxFuture<'static, ()>>;

/// The global rate-limit latch.
///
/// While engaged, every handler awaits the barrier before issuing. The first
/// writer wins: a second global observation while one delay is in flight is
/// ignored, since both came from the same server clock. The completer clears
/// the latch before waking waiters, so a freshly woken handler re-reading the
/// latch sees it open.
pub(crate) struct GlobalLatch {
    barrier: Mutex<Option<Barrier>>,
}

impl GlobalLatch {
    fn new() -> Self {
        Self { barrier: Mutex::new(None) }
    }

    pub(crate) fn current(&self) -> Option<Barrier> {
        self.barrier.lock().unwrap().clone()
    }

    pub(crate) fn engaged(&self) -> bool {
        self.barrier.lock().unwrap().is_some()
    }

    pub(crate) fn install(self: Arc<Self>, delay: Duration, sleeper: Arc<dyn Sleeper>) {
        let mut guard = self.barrier.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let waiter: BoxFuture<'static, ()> = Box::pin(async move {
            let _ = rx.await;
        });
        *guard = Some(waiter.shared());
        drop(guard);

        tracing::debug!(?delay, "global rate limit engaged");
        tokio::spawn(async move {
            sleeper.sleep(delay).await;
            self.barrier.lock().unwrap().take();
            let _ = tx.send(());
        });
    }
}

/// State shared between the manager and every bucket handler.
pub(crate) struct RestShared {
    pub(crate) options: RestOptions,
    pub(crate) token: ArcSwapOption<String>,
    pub(crate) hashes: Mutex<HashMap<String, String>>,
    pub(crate) global: Arc<GlobalLatch>,
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sleeper: Arc<dyn Sleeper>,
    sink: Mutex<SharedSink>,
}

impl RestShared {
    /// Fire-and-forget event emission; sink failures are swallowed.
    pub(crate) async fn emit(&self, event: RestEvent) {
        let sink = self.sink.lock().unwrap().clone();
        emit_best_effort(sink, event).await;
    }
}

/// The request dispatcher.
///
/// Clones share all state, so one manager can be handed to any number of
/// tasks. Requests to the same bucket complete in submission order; requests
/// to different buckets proceed independently, except while the global latch
/// is engaged.
#[derive(Clone)]
pub struct RestManager {
    shared: Arc<RestShared>,
    queues: Arc<Mutex<HashMap<String, Arc<BucketHandler>>>>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Default for RestManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RestManager {
    /// A manager over the real HTTP transport with default options. The
    /// initial token comes from `DISCORD_TOKEN` if set.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RestManagerBuilder {
        RestManagerBuilder::new()
    }

    /// Atomically replace the credential used by subsequent requests.
    pub fn set_token(&self, token: impl Into<String>) {
        self.shared.token.store(Some(Arc::new(token.into())));
    }

    /// Dispatch a request through its bucket queue.
    ///
    /// Looks up the learned bucket hash for `(method, route)` — falling back
    /// to a per-route placeholder so unlearned routes still serialize — then
    /// delegates to the handler keyed by `hash:major`, creating it on first
    /// use. Assembly failures (missing token) surface before anything is
    /// queued.
    pub async fn queue(
        &self,
        bucket: &RouteIdentifier,
        request: Request,
    ) -> Result<ResponseBody, RestError> {
        let hash = self
            .shared
            .hashes
            .lock()
            .unwrap()
            .get(&format!("{}-{}", request.method, bucket.route))
            .cloned()
            .unwrap_or_else(|| format!("UnknownHash({})", bucket.route));

        let handler = {
            let mut queues = self.queues.lock().unwrap();
            queues
                .entry(format!("{hash}:{}", bucket.major_parameter))
                .or_insert_with(|| {
                    Arc::new(BucketHandler::new(hash, bucket.major_parameter.clone()))
                })
                .clone()
        };

        let token = self.shared.token.load_full();
        let assembled =
            assemble(&request, &self.shared.options, token.as_deref().map(String::as_str))?;

        handler.push(&self.shared, bucket, assembled).await
    }

    /// One sweeper pass: drop every handler that is idle and unlimited.
    /// Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.shared.clock.now_millis();
        let mut queues = self.queues.lock().unwrap();
        let before = queues.len();
        queues.retain(|_, handler| !handler.inactive(now));
        let removed = before - queues.len();
        if removed > 0 {
            tracing::debug!(removed, active = queues.len(), "swept inactive bucket handlers");
        }
        removed
    }

    /// Spawn the periodic sweeper. Idempotent; stop it with [`shutdown`].
    ///
    /// [`shutdown`]: RestManager::shutdown
    pub fn start_sweeper(&self) {
        let mut guard = self.sweeper.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let manager = self.clone();
        *guard = Some(tokio::spawn(async move {
            loop {
                manager.shared.sleeper.sleep(SWEEP_INTERVAL).await;
                manager.sweep();
            }
        }));
    }

    /// Cancel the sweeper. Queued requests are unaffected.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// The bucket hash learned for `(method, route)`, if any.
    pub fn bucket_hash(&self, method: &Method, route: &str) -> Option<String> {
        self.shared.hashes.lock().unwrap().get(&format!("{method}-{route}")).cloned()
    }

    /// Number of live bucket handlers.
    pub fn handler_count(&self) -> usize {
        self.queues.lock().unwrap().len()
    }

    /// Keys (`hash:major`) of every live handler.
    pub fn bucket_keys(&self) -> Vec<String> {
        self.queues.lock().unwrap().keys().cloned().collect()
    }

    /// State of the handler stored under `key`, if it exists.
    pub fn bucket_snapshot(&self, key: &str) -> Option<BucketSnapshot> {
        let now = self.shared.clock.now_millis();
        self.queues.lock().unwrap().get(key).map(|h| h.snapshot(now))
    }

    /// Whether the global latch is currently engaged.
    pub fn global_engaged(&self) -> bool {
        self.shared.global.engaged()
    }

    /// CDN URL builder over the configured CDN base.
    pub fn cdn(&self) -> CdnEndpoints {
        CdnEndpoints::new(self.shared.options.cdn_base.clone())
    }

    pub fn options(&self) -> &RestOptions {
        &self.shared.options
    }
}

/// Builder for [`RestManager`], injecting transport, sink, clock, and
/// sleeper. Everything has a production default.
pub struct RestManagerBuilder {
    options: RestOptions,
    token: Option<String>,
    transport: Option<Arc<dyn HttpTransport>>,
    sink: Option<SharedSink>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl RestManagerBuilder {
    pub fn new() -> Self {
        Self {
            options: RestOptions::default(),
            token: std::env::var("DISCORD_TOKEN").ok(),
            transport: None,
            sink: None,
            clock: Arc::new(WallClock),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn options(mut self, options: RestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn event_sink<S>(mut self, sink: S) -> Self
    where
        S: EventSink<SinkError = std::convert::Infallible>,
        S::Future: Send + 'static,
    {
        self.sink = Some(BoxCloneService::new(sink));
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> RestManager {
        let shared = RestShared {
            options: self.options,
            token: ArcSwapOption::from(self.token.map(Arc::new)),
            hashes: Mutex::new(HashMap::new()),
            global: Arc::new(GlobalLatch::new()),
            transport: self.transport.unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
            clock: self.clock,
            sleeper: self.sleeper,
            sink: Mutex::new(self.sink.unwrap_or_else(|| BoxCloneService::new(LogSink))),
        };
        RestManager {
            shared: Arc::new(shared),
            queues: Arc::new(Mutex::new(HashMap::new())),
            sweeper: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for RestManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::routes;
    use crate::sleeper::NoopSleeper;
    use crate::transport::{ReplayItem, ReplayTransport, WireResponse};

    fn manager_with(transport: Arc<ReplayTransport>) -> RestManager {
        RestManager::builder()
            .token("test-token")
            .transport(transport)
            .clock(ManualClock::new(0))
            .sleeper(NoopSleeper)
            .build()
    }

    #[tokio::test]
    async fn unknown_routes_get_a_placeholder_keyed_handler() {
        let transport =
            Arc::new(ReplayTransport::new(vec![ReplayItem::Respond(WireResponse::new(204))]));
        let manager = manager_with(transport);

        let route = routes::gateway();
        manager.queue(&route.bucket, Request::get(route.path).auth(false)).await.unwrap();

        assert_eq!(manager.bucket_keys(), vec!["UnknownHash(/gateway):global".to_string()]);
    }

    #[tokio::test]
    async fn set_token_replaces_credential_for_later_requests() {
        let transport = Arc::new(ReplayTransport::new(vec![
            ReplayItem::Respond(WireResponse::new(204)),
            ReplayItem::Respond(WireResponse::new(204)),
        ]));
        let manager = manager_with(transport.clone());

        let route = routes::user_me();
        manager.queue(&route.bucket, Request::get(&route.path)).await.unwrap();
        manager.set_token("rotated");
        manager.queue(&route.bucket, Request::get(&route.path)).await.unwrap();

        let seen = transport.requests();
        assert_eq!(seen[0].header("authorization"), Some("Bot test-token"));
        assert_eq!(seen[1].header("authorization"), Some("Bot rotated"));
    }

    #[tokio::test]
    async fn missing_token_fails_before_anything_is_sent() {
        let transport = Arc::new(ReplayTransport::new(vec![]));
        let manager = RestManager::builder()
            .transport(transport.clone())
            .clock(ManualClock::new(0))
            .sleeper(NoopSleeper)
            .build();
        // The builder may have picked up DISCORD_TOKEN from the environment;
        // force the slot empty so the assembly path under test is real.
        manager.shared.token.store(None);

        let route = routes::user_me();
        let err = manager.queue(&route.bucket, Request::get(route.path)).await.unwrap_err();
        assert!(err.is_missing_token());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn sweep_drops_only_idle_open_handlers() {
        let transport = Arc::new(ReplayTransport::new(vec![
            ReplayItem::Respond(WireResponse::new(204)),
            ReplayItem::Respond(
                WireResponse::new(204)
                    .header("x-ratelimit-limit", "5")
                    .header("x-ratelimit-remaining", "0")
                    .header("x-ratelimit-reset-after", "60"),
            ),
        ]));
        let manager = manager_with(transport);

        let open = routes::gateway();
        manager.queue(&open.bucket, Request::get(open.path).auth(false)).await.unwrap();
        let drained = routes::channel("1");
        manager.queue(&drained.bucket, Request::get(drained.path)).await.unwrap();
        assert_eq!(manager.handler_count(), 2);

        // The drained handler is limited until its window resets; only the
        // idle open one may go.
        assert_eq!(manager.sweep(), 1);
        assert_eq!(manager.handler_count(), 1);
        assert!(manager.bucket_keys()[0].contains("/channels/1"));
    }

    #[tokio::test]
    async fn global_latch_first_writer_wins_and_clears() {
        let latch = Arc::new(GlobalLatch::new());
        assert!(!latch.engaged());

        latch.clone().install(Duration::from_millis(10), Arc::new(NoopSleeper));
        let barrier = latch.current().expect("latch should be engaged");
        // A second observation while engaged is ignored.
        latch.clone().install(Duration::from_secs(3600), Arc::new(NoopSleeper));

        barrier.await;
        assert!(!latch.engaged());
    }

    #[tokio::test]
    async fn sweeper_task_starts_once_and_stops() {
        let manager = RestManager::builder()
            .token("t")
            .transport(Arc::new(ReplayTransport::new(vec![])))
            .build();
        manager.start_sweeper();
        manager.start_sweeper();
        assert!(manager.sweeper.lock().unwrap().is_some());
        manager.shutdown();
        assert!(manager.sweeper.lock().unwrap().is_none());
    }

    #[test]
    fn cdn_uses_configured_base() {
        let manager = RestManager::builder()
            .options(RestOptions::default().cdn_base("https://cdn.example"))
            .transport(Arc::new(ReplayTransport::new(vec![])))
            .build();
        assert_eq!(manager.cdn().default_avatar(0), "https://cdn.example/embed/avatars/0.png");
    }
}
