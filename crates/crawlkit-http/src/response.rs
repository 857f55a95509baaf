//! Reconstructed response model and its buffer-backed body.

use std::io::{self, Cursor, Read};
use std::pin::Pin;
use std::task::{Context, Poll};

use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url, Version};
use tokio::io::{AsyncRead, ReadBuf};

use crate::request::Request;

/// Response body whose bytes were already received in full.
///
/// Readable once through [`Read`] or [`AsyncRead`]; a drained or closed
/// body reads as EOF. Closing never fails because no connection is held.
#[derive(Debug, Default)]
pub struct ResponseBody {
    buf: Option<Cursor<Vec<u8>>>,
}

impl ResponseBody {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            buf: Some(Cursor::new(bytes)),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.as_ref().map_or(0, |cursor| {
            let total = cursor.get_ref().len();
            let pos = usize::try_from(cursor.position()).unwrap_or(total);
            total.saturating_sub(pos)
        })
    }

    /// Releases the buffer. Idempotent.
    pub fn close(&mut self) {
        self.buf = None;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.buf.is_none()
    }

    /// Drains the unread bytes. Later reads see EOF.
    pub fn bytes(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.remaining());
        if let Some(cursor) = self.buf.as_mut() {
            // Reading from an in-memory cursor cannot fail.
            let _ = cursor.read_to_end(&mut out);
        }
        out
    }

    /// Drains the unread bytes as UTF-8, replacing invalid sequences.
    pub fn text(&mut self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }
}

impl Read for ResponseBody {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        match self.buf.as_mut() {
            Some(cursor) => cursor.read(out),
            None => Ok(0),
        }
    }
}

impl AsyncRead for ResponseBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().buf.as_mut() {
            Some(cursor) => Pin::new(cursor).poll_read(cx, out),
            None => Poll::Ready(Ok(())),
        }
    }
}

/// A response rebuilt from a remote dispatch reply.
///
/// `request` points at the request that produced this hop. When the remote
/// side followed redirects, that request carries the previous hop's
/// response, forming a chain walked backwards from the final hop.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    /// Status line text, e.g. `"200 OK"`.
    pub status_text: String,
    /// Protocol string, e.g. `"HTTP/1.1"`.
    pub proto: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub content_length: Option<u64>,
    /// The body was already decompressed upstream; do not decode it again.
    pub uncompressed: bool,
    pub request: Option<Box<Request>>,
}

impl Response {
    /// An empty response with the given status, for building replies by hand.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_text: status_line(status),
            proto: "HTTP/1.1".to_owned(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: ResponseBody::empty(),
            content_length: None,
            uncompressed: false,
            request: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// URL of the request that produced this hop.
    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.request.as_ref().map(|req| &req.url)
    }

    /// The upstream hop immediately before this one.
    #[must_use]
    pub fn previous(&self) -> Option<&Response> {
        self.request.as_ref()?.response.as_deref()
    }

    /// Earlier hops, nearest first.
    #[must_use]
    pub fn redirect_chain(&self) -> RedirectChain<'_> {
        RedirectChain {
            next: self.previous(),
        }
    }

    /// Number of upstream hops before this response.
    #[must_use]
    pub fn hops(&self) -> usize {
        self.redirect_chain().count()
    }
}

/// Iterator over the upstream hops of a [`Response`].
#[derive(Debug, Clone)]
pub struct RedirectChain<'a> {
    next: Option<&'a Response>,
}

impl<'a> Iterator for RedirectChain<'a> {
    type Item = &'a Response;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.previous();
        Some(current)
    }
}

/// `"200 OK"` style status line for a status code.
#[must_use]
pub fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}
