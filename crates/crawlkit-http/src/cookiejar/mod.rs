//! Cookie storage capability shared by every dispatch client.

mod cookie;
mod local;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::HttpError;
use crate::meta::RequestMeta;

pub use cookie::{Cookie, SameSite};
pub use local::LocalCookieJar;

/// Per-URL cookie storage.
///
/// Implementations must tolerate concurrent calls from many requests
/// without corrupting per-domain cookie sets.
#[async_trait]
pub trait CookieJar: Send + Sync {
    /// Cookies that would be sent to `url`.
    async fn cookies(&self, meta: &RequestMeta, url: &Url) -> Result<Vec<Cookie>, HttpError>;

    /// Stores `cookies` as if received in a response from `url`.
    async fn set_cookies(
        &self,
        meta: &RequestMeta,
        url: &Url,
        cookies: &[Cookie],
    ) -> Result<(), HttpError>;

    /// Removes every cookie currently visible to `url`.
    async fn clear(&self, meta: &RequestMeta, url: &Url) -> Result<(), HttpError>;
}
