// ── Runtime feed configuration ──
//
// These types describe *how* to consume a feed: where it lives, how hard
// to retry, how long to hide short outages. They never touch disk.
// The CLI (via marketfeed-config) constructs a `FeedConfig` and hands it in.

use std::time::Duration;

use url::Url;

use crate::error::CoreError;
use crate::store::SectionLayout;

pub const DEFAULT_FEED_URL: &str = "ws://localhost:8001/ws";

/// Bounded exponential backoff for reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Base delay; retry `k` waits `initial_delay * 2^k`. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on any single delay. Default: 30s.
    pub max_delay: Duration,

    /// Consecutive failed attempts tolerated before giving up. Default: 5.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Configuration for one feed instance.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Upstream WebSocket address.
    pub url: Url,
    /// Reconnection policy parameters.
    pub reconnect: ReconnectConfig,
    /// Grace period after fresh data during which disconnects stay invisible.
    pub debounce_window: Duration,
    /// Send WebSocket pings at this interval while connected.
    pub keepalive_interval: Option<Duration>,
    /// Which payload sections are fast- or slow-changing.
    pub layout: SectionLayout,
}

impl FeedConfig {
    /// Config for `url` with every other knob at its default.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !matches!(self.url.scheme(), "ws" | "wss") {
            return Err(CoreError::Config {
                message: format!("feed URL must use ws:// or wss://, got {}", self.url),
            });
        }
        if self.reconnect.initial_delay.is_zero() {
            return Err(CoreError::Config {
                message: "initial retry delay must be greater than zero".into(),
            });
        }
        if self.reconnect.max_delay < self.reconnect.initial_delay {
            return Err(CoreError::Config {
                message: format!(
                    "max retry delay ({:?}) is shorter than the initial delay ({:?})",
                    self.reconnect.max_delay, self.reconnect.initial_delay
                ),
            });
        }
        if self.keepalive_interval.is_some_and(|d| d.is_zero()) {
            return Err(CoreError::Config {
                message: "keepalive interval must be greater than zero".into(),
            });
        }
        self.layout.validate()
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_FEED_URL).expect("default feed URL is valid"),
            reconnect: ReconnectConfig::default(),
            debounce_window: Duration::from_secs(5),
            keepalive_interval: None,
            layout: SectionLayout::dashboard(),
        }
    }
}
