//! Dispatch through the remote proxy-manager service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crawlkit_http::response::status_line;
use crawlkit_http::{Client, CookieJar, HttpError, Options, Request, Response, StatusCode};

use crate::reconstruct::{headers_to_wire, into_response};
use crate::rpc::RpcChannel;
use crate::wire::{ProxyReply, ProxyRequest, WireOptions};

const SERVICE: &str = "ProxyManager";
const METHOD_DO: &str = "Do";

/// A [`Client`] that hands every request to the proxy manager and rebuilds
/// the response, redirect chain included, from its reply.
///
/// Holds no per-request state; share one instance behind an `Arc`.
pub struct ProxyClient {
    channel: Arc<RpcChannel>,
    jar: Arc<dyn CookieJar>,
}

impl ProxyClient {
    #[must_use]
    pub fn new(channel: Arc<RpcChannel>, jar: Arc<dyn CookieJar>) -> Self {
        Self { channel, jar }
    }

    #[must_use]
    pub fn builder() -> ProxyClientBuilder {
        ProxyClientBuilder::default()
    }
}

/// Assembles a [`ProxyClient`] from optional parts, for callers wiring
/// dependencies that may be absent at runtime.
#[derive(Default)]
pub struct ProxyClientBuilder {
    channel: Option<Arc<RpcChannel>>,
    jar: Option<Arc<dyn CookieJar>>,
}

impl ProxyClientBuilder {
    #[must_use]
    pub fn channel(mut self, channel: Arc<RpcChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    #[must_use]
    pub fn jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// # Errors
    ///
    /// Returns [`HttpError::InvalidArgument`] when the channel or the jar
    /// was never supplied.
    pub fn build(self) -> Result<ProxyClient, HttpError> {
        let channel = self
            .channel
            .ok_or_else(|| HttpError::InvalidArgument("proxy client needs an RPC channel".to_owned()))?;
        let jar = self
            .jar
            .ok_or_else(|| HttpError::InvalidArgument("proxy client needs a cookie jar".to_owned()))?;
        Ok(ProxyClient::new(channel, jar))
    }
}

#[async_trait]
impl Client for ProxyClient {
    async fn do_with_options(
        &self,
        mut request: Request,
        options: &Options,
    ) -> Result<Response, HttpError> {
        let body = request.take_body_bytes().await?.unwrap_or_default();
        let payload = build_payload(&request, body, options, Instant::now());
        let meta = request.meta.clone();

        tracing::debug!(
            req_id = %payload.req_id,
            tracing_id = %payload.tracing_id,
            url = %payload.url,
            method = %payload.method,
            reliability = %options.reliability,
            ttl_secs = payload.options.max_ttl_per_request,
            "dispatching request through proxy manager"
        );

        let reply: ProxyReply = match self.channel.call(SERVICE, METHOD_DO, &payload, &meta).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    req_id = %payload.req_id,
                    tracing_id = %payload.tracing_id,
                    url = %payload.url,
                    error = %e,
                    "proxy manager call failed"
                );
                return Err(e);
            }
        };

        if reply.status_code != 200 {
            let status = remote_status_text(&reply);
            tracing::warn!(
                req_id = %payload.req_id,
                url = %payload.url,
                status = reply.status_code,
                "proxy manager reported a non-success status"
            );
            return Err(HttpError::RemoteStatus {
                code: reply.status_code,
                status,
            });
        }

        tracing::debug!(
            req_id = %payload.req_id,
            url = %payload.url,
            status = reply.status_code,
            body_len = reply.body.len(),
            "proxy manager replied"
        );

        into_response(reply, Some(request), &meta)
    }

    fn cookie_jar(&self) -> Arc<dyn CookieJar> {
        Arc::clone(&self.jar)
    }
}

/// The `ProxyManager/Do` payload for `request`, whose body has already been
/// taken out and read into `body`.
pub(crate) fn build_payload(
    request: &Request,
    body: Vec<u8>,
    options: &Options,
    now: Instant,
) -> ProxyRequest {
    let meta = &request.meta;
    ProxyRequest {
        tracing_id: meta.tracing_id.clone().unwrap_or_default(),
        job_id: meta.job_id.clone().unwrap_or_default(),
        req_id: meta.request_id_or_generate(),
        method: request.method.as_str().to_owned(),
        url: request.url.to_string(),
        body,
        headers: headers_to_wire(&request.headers),
        options: WireOptions {
            enable_proxy: options.enable_proxy,
            reliability: options.reliability,
            enable_headless: options.enable_headless,
            enable_session_init: options.enable_session_init,
            keep_session: options.keep_session,
            disable_cookie_jar: options.disable_cookie_jar,
            max_ttl_per_request: options.effective_ttl(meta.deadline, now),
            disable_redirect: options.disable_redirect,
            request_filter_keys: options.request_filter_keys.clone(),
            js_wait_duration_ms: options
                .js_wait_duration
                .map_or(0, |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        },
    }
}

/// Status text for an error reply, falling back to the canonical reason
/// when the remote side left it blank.
fn remote_status_text(reply: &ProxyReply) -> String {
    if !reply.status.is_empty() {
        return reply.status.clone();
    }
    u16::try_from(reply.status_code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .map_or_else(|| format!("status {}", reply.status_code), status_line)
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
