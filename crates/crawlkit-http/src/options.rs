//! Per-request crawling policy.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// TTL used when the caller has no deadline, or one too close to be useful.
pub const DEFAULT_MAX_TTL_PER_REQUEST_SECS: u64 = 300;

/// A deadline must leave more than this much time to override the default TTL.
pub const DEADLINE_TTL_THRESHOLD: Duration = Duration::from_secs(30);

/// Proxy quality tier. The proxy fleet tries egress paths from `Low` upward.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reliability {
    #[default]
    Low,
    Medium,
    High,
    #[serde(rename = "HA")]
    Ha,
}

impl fmt::Display for Reliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reliability::Low => write!(f, "low"),
            Reliability::Medium => write!(f, "medium"),
            Reliability::High => write!(f, "high"),
            Reliability::Ha => write!(f, "ha"),
        }
    }
}

impl FromStr for Reliability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Reliability::Low),
            "medium" => Ok(Reliability::Medium),
            "high" => Ok(Reliability::High),
            "ha" => Ok(Reliability::Ha),
            other => Err(format!(
                "unknown reliability \"{other}\" (expected low, medium, high or ha)"
            )),
        }
    }
}

/// Crawling policy attached to a single dispatch call.
///
/// Build it with struct update syntax over [`Options::default`]:
///
/// ```
/// use crawlkit_http::{Options, Reliability};
///
/// let opts = Options {
///     enable_proxy: true,
///     reliability: Reliability::High,
///     ..Options::default()
/// };
/// assert_eq!(opts.max_ttl_per_request, 300);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub enable_proxy: bool,
    pub reliability: Reliability,
    /// Render the page in a headless browser on the remote side.
    pub enable_headless: bool,
    /// First request of a crawl: bootstrap a remote session before fetching.
    pub enable_session_init: bool,
    /// Reuse the remote session across requests.
    pub keep_session: bool,
    pub disable_cookie_jar: bool,
    pub disable_redirect: bool,
    /// Header names the proxy echoes back; empty means all.
    pub request_filter_keys: Vec<String>,
    /// Fallback end-to-end TTL in seconds, used when no usable deadline exists.
    pub max_ttl_per_request: u64,
    /// How long the headless renderer waits for scripts to settle.
    pub js_wait_duration: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enable_proxy: false,
            reliability: Reliability::Low,
            enable_headless: false,
            enable_session_init: false,
            keep_session: false,
            disable_cookie_jar: false,
            disable_redirect: false,
            request_filter_keys: Vec::new(),
            max_ttl_per_request: DEFAULT_MAX_TTL_PER_REQUEST_SECS,
            js_wait_duration: None,
        }
    }
}

impl Options {
    /// Proxying enabled at the given tier, everything else default.
    #[must_use]
    pub fn proxied(reliability: Reliability) -> Self {
        Self {
            enable_proxy: true,
            reliability,
            ..Self::default()
        }
    }

    /// TTL in whole seconds the remote side should honour for this call.
    ///
    /// With a deadline more than [`DEADLINE_TTL_THRESHOLD`] away the TTL is
    /// the remaining time rounded up, so it is never shorter than what the
    /// caller allows. Otherwise `max_ttl_per_request` applies.
    #[must_use]
    pub fn effective_ttl(&self, deadline: Option<Instant>, now: Instant) -> u64 {
        let fallback = if self.max_ttl_per_request == 0 {
            DEFAULT_MAX_TTL_PER_REQUEST_SECS
        } else {
            self.max_ttl_per_request
        };

        match deadline.map(|d| d.saturating_duration_since(now)) {
            Some(remaining) if remaining > DEADLINE_TTL_THRESHOLD => {
                remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
            }
            _ => fallback,
        }
    }
}
