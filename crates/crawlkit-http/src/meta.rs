//! Request-scoped metadata threaded explicitly through a request chain.

use std::time::{Duration, Instant};

/// Identifiers and deadline shared by every request in one crawl chain.
///
/// Spiders copy it into follow-up requests with [`RequestMeta::child`], so
/// tracing and job ids, the deadline and pagination state survive across
/// hops without an untyped context bag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub tracing_id: Option<String>,
    pub job_id: Option<String>,
    pub req_id: Option<String>,
    pub deadline: Option<Instant>,
    /// Position of the item being produced, for orchestrators that index output.
    pub item_index: Option<u64>,
    /// Opaque pagination cursor carried to the next page request.
    pub cursor: Option<String>,
}

impl RequestMeta {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tracing_id(mut self, tracing_id: impl Into<String>) -> Self {
        self.tracing_id = Some(tracing_id.into());
        self
    }

    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    #[must_use]
    pub fn with_req_id(mut self, req_id: impl Into<String>) -> Self {
        self.req_id = Some(req_id.into());
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline to `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    #[must_use]
    pub fn with_item_index(mut self, index: u64) -> Self {
        self.item_index = Some(index);
        self
    }

    /// Time left until the deadline, saturating at zero. `None` without a deadline.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// The caller's request id, or a freshly generated `req_<hex>` one.
    #[must_use]
    pub fn request_id_or_generate(&self) -> String {
        match self.req_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => generate_request_id(),
        }
    }

    /// Metadata for a follow-up request in the same chain.
    ///
    /// Everything is inherited except the request id, which identifies a
    /// single request and must not be reused.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            req_id: None,
            ..self.clone()
        }
    }
}

#[must_use]
pub fn generate_request_id() -> String {
    format!("req_{:016x}", rand::random::<u64>())
}
