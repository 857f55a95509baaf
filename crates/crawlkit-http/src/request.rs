//! Outbound request model.

use std::fmt;
use std::pin::Pin;

use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::HttpError;
use crate::meta::RequestMeta;
use crate::response::Response;

/// Request payload: bytes already in memory, or a stream read on dispatch.
pub enum RequestBody {
    Bytes(Vec<u8>),
    Stream(Pin<Box<dyn AsyncRead + Send + Sync>>),
}

impl RequestBody {
    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        RequestBody::Stream(Box::pin(reader))
    }

    /// Reads the whole body into memory.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Io`] if the underlying stream fails.
    pub async fn into_bytes(self) -> Result<Vec<u8>, HttpError> {
        match self {
            RequestBody::Bytes(bytes) => Ok(bytes),
            RequestBody::Stream(mut reader) => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|source| HttpError::Io {
                        context: "reading request body".to_owned(),
                        source,
                    })?;
                Ok(buf)
            }
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            RequestBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Bytes(s.into_bytes())
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Bytes(s.as_bytes().to_vec())
    }
}

/// An HTTP request handed to a [`crate::Client`].
///
/// `response` is only populated on requests reconstructed from a redirect
/// chain: it holds the upstream hop that led to this request.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub meta: RequestMeta,
    pub response: Option<Box<Response>>,
}

impl Request {
    /// Builds a request from a method name and an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidArgument`] if `method` is empty or not a
    /// valid token, or if `url` does not parse as an absolute URL.
    pub fn new(method: &str, url: &str, body: Option<RequestBody>) -> Result<Self, HttpError> {
        if method.is_empty() {
            return Err(HttpError::InvalidArgument("empty HTTP method".to_owned()));
        }
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| HttpError::InvalidArgument(format!("invalid method \"{method}\": {e}")))?;
        let url = Url::parse(url)
            .map_err(|e| HttpError::InvalidArgument(format!("invalid URL \"{url}\": {e}")))?;

        let mut request = Self::from_parts(method, url);
        request.body = body;
        Ok(request)
    }

    /// Shorthand for a body-less `GET`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidArgument`] if `url` does not parse.
    pub fn get(url: &str) -> Result<Self, HttpError> {
        Self::new("GET", url, None)
    }

    /// Builds a request from already-validated parts.
    #[must_use]
    pub fn from_parts(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            meta: RequestMeta::default(),
            response: None,
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: RequestMeta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Takes the body out and reads it fully. `Ok(None)` when there is no body.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Io`] if reading a stream body fails.
    pub async fn take_body_bytes(&mut self) -> Result<Option<Vec<u8>>, HttpError> {
        match self.body.take() {
            Some(body) => body.into_bytes().await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use super::*;

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")))
        }
    }

    #[test]
    fn new_rejects_empty_method() {
        let err = Request::new("", "https://example.com/x", None).unwrap_err();
        assert!(matches!(err, HttpError::InvalidArgument(_)), "got {err:?}");
    }

    #[test]
    fn new_rejects_unparsable_url() {
        let err = Request::new("GET", "not a url", None).unwrap_err();
        assert!(matches!(err, HttpError::InvalidArgument(_)), "got {err:?}");
    }

    #[test]
    fn new_rejects_relative_url() {
        let err = Request::new("GET", "/products?page=2", None).unwrap_err();
        assert!(matches!(err, HttpError::InvalidArgument(_)), "got {err:?}");
    }

    #[test]
    fn new_accepts_custom_method() {
        let req = Request::new("PURGE", "https://example.com/cache", None).unwrap();
        assert_eq!(req.method.as_str(), "PURGE");
        assert!(!req.has_body());
    }

    #[tokio::test]
    async fn take_body_bytes_reads_stream_once() {
        let mut req = Request::new(
            "POST",
            "https://example.com/api",
            Some(RequestBody::stream(&b"{\"q\":1}"[..])),
        )
        .unwrap();

        let first = req.take_body_bytes().await.unwrap();
        assert_eq!(first.as_deref(), Some(&b"{\"q\":1}"[..]));
        assert!(req.take_body_bytes().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn take_body_bytes_surfaces_read_failure_as_io() {
        let mut req = Request::new(
            "POST",
            "https://example.com/api",
            Some(RequestBody::stream(FailingReader)),
        )
        .unwrap();

        let err = req.take_body_bytes().await.unwrap_err();
        assert!(matches!(err, HttpError::Io { .. }), "got {err:?}");
    }
}
