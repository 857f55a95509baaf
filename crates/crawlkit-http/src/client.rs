//! The transport-agnostic client contract spiders depend on.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cookiejar::CookieJar;
use crate::error::HttpError;
use crate::options::Options;
use crate::request::Request;
use crate::response::Response;

/// Executes a request under a crawling policy and returns the full response.
///
/// Each call is a single attempt: either a complete [`Response`] comes back
/// or an error does, never both. Retrying is the caller's decision (see
/// [`HttpError::is_retriable`]). Dropping the returned future cancels the
/// in-flight call; the request deadline in [`Request::meta`] bounds it.
#[async_trait]
pub trait Client: Send + Sync {
    /// Dispatches with [`Options::default`].
    async fn do_request(&self, request: Request) -> Result<Response, HttpError> {
        let options = Options::default();
        self.do_with_options(request, &options).await
    }

    async fn do_with_options(
        &self,
        request: Request,
        options: &Options,
    ) -> Result<Response, HttpError>;

    /// Jar holding the cookies this client's crawls share.
    fn cookie_jar(&self) -> Arc<dyn CookieJar>;
}
