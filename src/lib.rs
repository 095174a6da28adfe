#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Turnstile 🎟️
//!
//! Rate-limit-aware request dispatcher for the Discord REST API.
//!
//! Discord communicates dynamic, route-keyed token-bucket limits through
//! response headers; clients that ignore them are banned in short order.
//! Turnstile accepts logical requests, serializes them through per-bucket
//! FIFO queues, learns each route's true bucket hash at runtime, honors the
//! server-wide global limit, retries recoverable failures, and surfaces
//! structured errors.
//!
//! ## Features
//!
//! - **Bucket hash learning** from `X-RateLimit-Bucket`, with lazy handler
//!   migration when a route's bucket moves
//! - **Per-bucket FIFO queues** with wait-on-reset semantics and at most one
//!   request in flight per bucket
//! - **Global rate-limit latch** shared across all buckets
//! - **Bounded retries** for timeouts and 5xx; transparent 429 replays
//! - **Request assembly**: URL templating, query encoding, audit-log reason,
//!   JSON and multipart bodies
//! - **Observability** through `tower`-service event sinks and `tracing`
//! - **Deterministic tests** via injectable clock, sleeper, and transport
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use turnstile::{routes, Request, RestManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), turnstile::RestError> {
//!     let manager = RestManager::builder().token("my-bot-token").build();
//!     manager.start_sweeper();
//!
//!     let route = routes::user_me();
//!     let me = manager.queue(&route.bucket, Request::get(route.path)).await?;
//!     println!("logged in as {:?}", me.json());
//!
//!     manager.shutdown();
//!     Ok(())
//! }
//! ```

pub mod bucket;
pub mod cdn;
pub mod clock;
pub mod error;
pub mod events;
pub mod manager;
pub mod options;
pub mod request;
pub mod response;
pub mod routes;
pub mod sleeper;
pub mod transport;

// Re-exports
pub use bucket::{BucketHandler, BucketSnapshot};
pub use cdn::{CdnEndpoints, CdnError};
pub use clock::{Clock, ManualClock, WallClock};
pub use error::RestError;
pub use events::{
    EventSink, LogSink, MemorySink, NullSink, RatelimitInfo, RestEvent, SharedSink,
};
pub use manager::{RestManager, RestManagerBuilder};
pub use options::RestOptions;
pub use request::{AssembledRequest, FileAttachment, Request, RequestBody};
pub use response::ResponseBody;
pub use routes::{ApiRoute, RouteIdentifier};
pub use sleeper::{NoopSleeper, RecordingSleeper, Sleeper, TokioSleeper};
pub use transport::{HttpTransport, ReplayItem, ReplayTransport, ReqwestTransport, WireResponse};
