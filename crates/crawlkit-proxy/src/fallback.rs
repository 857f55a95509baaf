//! Primary/secondary client pairing.

use std::sync::Arc;

use async_trait::async_trait;
use crawlkit_http::{Client, CookieJar, HttpError, Options, Request, RequestBody, Response};

/// Sends through `primary` and retries once through `secondary` when the
/// primary transport is unreachable.
///
/// Only [`HttpError::Transport`] and [`HttpError::TransportStatus`] trigger
/// the second attempt. A remote status, a bad reply or an expired deadline
/// is returned as is.
pub struct FallbackClient {
    primary: Arc<dyn Client>,
    secondary: Arc<dyn Client>,
}

impl FallbackClient {
    #[must_use]
    pub fn new(primary: Arc<dyn Client>, secondary: Arc<dyn Client>) -> Self {
        Self { primary, secondary }
    }
}

fn should_fall_back(err: &HttpError) -> bool {
    matches!(
        err,
        HttpError::Transport(_) | HttpError::TransportStatus { .. }
    )
}

/// A body-less copy of `request` carrying `body`.
fn duplicate(request: &Request, body: Option<&Vec<u8>>) -> Request {
    let mut copy = Request::from_parts(request.method.clone(), request.url.clone())
        .with_meta(request.meta.clone());
    copy.headers = request.headers.clone();
    copy.body = body.cloned().map(RequestBody::Bytes);
    copy
}

#[async_trait]
impl Client for FallbackClient {
    async fn do_with_options(
        &self,
        mut request: Request,
        options: &Options,
    ) -> Result<Response, HttpError> {
        let body = request.take_body_bytes().await?;
        let retry = duplicate(&request, body.as_ref());
        request.body = body.map(RequestBody::Bytes);

        match self.primary.do_with_options(request, options).await {
            Err(e) if should_fall_back(&e) => {
                tracing::warn!(url = %retry.url, error = %e, "primary client unreachable, using secondary");
                self.secondary.do_with_options(retry, options).await
            }
            other => other,
        }
    }

    fn cookie_jar(&self) -> Arc<dyn CookieJar> {
        self.primary.cookie_jar()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crawlkit_http::{LocalCookieJar, StatusCode};

    use super::*;

    struct Scripted {
        calls: AtomicUsize,
        seen_bodies: Mutex<Vec<Vec<u8>>>,
        fail_with: Option<fn() -> HttpError>,
        jar: Arc<dyn CookieJar>,
    }

    impl Scripted {
        fn new(fail_with: Option<fn() -> HttpError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen_bodies: Mutex::new(Vec::new()),
                fail_with,
                jar: Arc::new(LocalCookieJar::new()),
            })
        }
    }

    #[async_trait]
    impl Client for Scripted {
        async fn do_with_options(
            &self,
            mut request: Request,
            _options: &Options,
        ) -> Result<Response, HttpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = request.take_body_bytes().await?.unwrap_or_default();
            self.seen_bodies.lock().unwrap().push(body);
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(Response::new(StatusCode::OK)),
            }
        }

        fn cookie_jar(&self) -> Arc<dyn CookieJar> {
            Arc::clone(&self.jar)
        }
    }

    fn post() -> Request {
        Request::new("POST", "https://example.com/api", Some("payload".into())).unwrap()
    }

    #[tokio::test]
    async fn transport_status_falls_back_with_same_body() {
        let primary = Scripted::new(Some(|| HttpError::TransportStatus {
            status: 503,
            url: "http://rpc".to_owned(),
        }));
        let secondary = Scripted::new(None);
        let client = FallbackClient::new(primary.clone(), secondary.clone());

        let resp = client.do_request(post()).await.unwrap();

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.seen_bodies.lock().unwrap()[0], b"payload");
        assert_eq!(primary.seen_bodies.lock().unwrap()[0], b"payload");
    }

    #[tokio::test]
    async fn remote_status_is_not_retried() {
        let primary = Scripted::new(Some(|| HttpError::RemoteStatus {
            code: 502,
            status: "Bad Gateway".to_owned(),
        }));
        let secondary = Scripted::new(None);
        let client = FallbackClient::new(primary.clone(), secondary.clone());

        let err = client.do_request(post()).await.unwrap_err();

        assert!(matches!(err, HttpError::RemoteStatus { code: 502, .. }));
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cookie_jar_is_the_primary_jar() {
        let primary = Scripted::new(None);
        let secondary = Scripted::new(None);
        let client = FallbackClient::new(primary.clone(), secondary);
        assert!(Arc::ptr_eq(&client.cookie_jar(), &primary.jar));
    }
}
