//! Dispatcher configuration.

use std::time::Duration;

/// Default API version the dispatcher speaks.
pub const DEFAULT_API_VERSION: u8 = 7;
/// Default REST base.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api";
/// Default CDN base.
pub const DEFAULT_CDN_BASE: &str = "https://cdn.discordapp.com";

/// Tunables for a [`RestManager`](crate::RestManager).
///
/// `offset` is extra slack, in milliseconds, added to every server-supplied
/// reset or retry delay to absorb clock skew between this host and the API
/// edge. It is clamped to zero or above at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestOptions {
    pub user_agent_appendix: String,
    pub offset: u64,
    pub retries: u32,
    pub timeout: Duration,
    pub version: u8,
    pub api_base: String,
    pub cdn_base: String,
}

impl Default for RestOptions {
    fn default() -> Self {
        Self {
            user_agent_appendix: format!("Rust/{}", env!("CARGO_PKG_RUST_VERSION")),
            offset: 100,
            retries: 1,
            timeout: Duration::from_millis(15_000),
            version: DEFAULT_API_VERSION,
            api_base: DEFAULT_API_BASE.to_string(),
            cdn_base: DEFAULT_CDN_BASE.to_string(),
        }
    }
}

impl RestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeform suffix appended to the `User-Agent` header.
    pub fn user_agent_appendix(mut self, appendix: impl Into<String>) -> Self {
        self.user_agent_appendix = appendix.into();
        self
    }

    /// Skew slack in milliseconds; negative values clamp to zero.
    pub fn offset(mut self, offset_millis: i64) -> Self {
        self.offset = offset_millis.max(0) as u64;
        self
    }

    /// How many times an aborted or 5xx attempt is retried.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Per-attempt abort timer.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// API version segment of every request URL.
    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// REST base URL, without the version segment.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// CDN base URL.
    pub fn cdn_base(mut self, base: impl Into<String>) -> Self {
        self.cdn_base = base.into();
        self
    }
}
