//! Dispatcher observations: rate-limit stalls and debug notes.
//!
//! Events flow through sinks implemented as `tower::Service<RestEvent>`.
//! Emission is best-effort: a sink that is not ready or errors simply loses
//! the event, so observation can never backpressure the request path.

use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Serialize;
use tower::util::BoxCloneService;
use tower::Service;

/// Emitted when a handler is about to stall on a local rate-limit window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatelimitInfo {
    /// How long the handler will sleep before issuing.
    pub time_to_reset: Duration,
    /// Total requests the window allows.
    pub limit: u64,
    /// HTTP method of the stalled request.
    pub method: String,
    /// Bucket hash of the handler.
    pub hash: String,
    /// Generalized route of the stalled request.
    pub route: String,
    /// Major parameter of the handler.
    pub major_parameter: String,
}

/// Observations emitted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestEvent {
    /// A request is waiting out a local rate-limit window.
    Ratelimited(RatelimitInfo),
    /// Diagnostic note (429 hits, bucket hash migrations).
    Debug(String),
}

impl fmt::Display for RestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ratelimited(info) => write!(
                f,
                "ratelimited {} {} (bucket {}:{}) for {:?}",
                info.method, info.route, info.hash, info.major_parameter, info.time_to_reset
            ),
            Self::Debug(msg) => write!(f, "{msg}"),
        }
    }
}

/// A sink that consumes dispatcher events.
pub trait EventSink:
    Service<RestEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Type-erased sink handle stored by the manager and cloned per emission.
pub type SharedSink = BoxCloneService<RestEvent, (), Infallible>;

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
pub async fn emit_best_effort<S>(sink: S, event: RestEvent)
where
    S: Service<RestEvent, Response = ()> + Send + Clone + 'static,
    S::Error: Send,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

/// A sink that discards every event.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<RestEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: RestEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl EventSink for NullSink {
    type SinkError = Infallible;
}

/// A sink that logs through `tracing`: stalls at warn, notes at debug.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<RestEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RestEvent) -> Self::Future {
        match &event {
            RestEvent::Ratelimited(_) => tracing::warn!(event = %event, "rest_event"),
            RestEvent::Debug(_) => tracing::debug!(event = %event, "rest_event"),
        }
        Box::pin(async { Ok(()) })
    }
}

impl EventSink for LogSink {
    type SinkError = Infallible;
}

/// A sink that stores events in memory, oldest evicted first at capacity.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<RestEvent>>>,
    capacity: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { events: Arc::new(Mutex::new(Vec::new())), capacity: capacity.max(1) }
    }

    pub fn events(&self) -> Vec<RestEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Only the `Debug` messages, in arrival order.
    pub fn debug_messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                RestEvent::Debug(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    /// Only the `Ratelimited` payloads, in arrival order.
    pub fn ratelimits(&self) -> Vec<RatelimitInfo> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                RestEvent::Ratelimited(info) => Some(info.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<RestEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RestEvent) -> Self::Future {
        let mut guard = self.events.lock().unwrap();
        if guard.len() >= self.capacity {
            guard.remove(0);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl EventSink for MemorySink {
    type SinkError = Infallible;
}
