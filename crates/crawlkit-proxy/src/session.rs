//! Cookie jar backed by the remote session-manager service.

use std::sync::Arc;

use async_trait::async_trait;
use crawlkit_http::{Cookie, CookieJar, HttpError, RequestMeta, Url};

use crate::rpc::RpcChannel;
use crate::wire::{Ack, SessionCookiesReply, SessionCookiesRequest};

const SERVICE: &str = "SessionManager";

/// A [`CookieJar`] with no local state: every call is one RPC to the
/// session manager, so crawls on different hosts share the same sessions.
#[derive(Debug, Clone)]
pub struct RemoteCookieJar {
    channel: Arc<RpcChannel>,
}

impl RemoteCookieJar {
    #[must_use]
    pub fn new(channel: Arc<RpcChannel>) -> Self {
        Self { channel }
    }

    async fn invoke<Resp>(
        &self,
        method: &str,
        meta: &RequestMeta,
        url: &Url,
        cookies: Vec<Cookie>,
    ) -> Result<Resp, HttpError>
    where
        Resp: serde::de::DeserializeOwned,
    {
        let request = SessionCookiesRequest {
            tracing_id: meta.tracing_id.clone().unwrap_or_default(),
            url: url.to_string(),
            cookies,
        };
        self.channel
            .call(SERVICE, method, &request, meta)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    method,
                    tracing_id = %request.tracing_id,
                    url = %url,
                    error = %e,
                    "session manager call failed"
                );
            })
    }
}

/// Session cookies only exist for web origins.
fn is_web_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host().is_some()
}

#[async_trait]
impl CookieJar for RemoteCookieJar {
    async fn cookies(&self, meta: &RequestMeta, url: &Url) -> Result<Vec<Cookie>, HttpError> {
        if !is_web_url(url) {
            return Ok(Vec::new());
        }
        let reply: SessionCookiesReply = self.invoke("GetCookies", meta, url, Vec::new()).await?;
        Ok(reply.cookies)
    }

    async fn set_cookies(
        &self,
        meta: &RequestMeta,
        url: &Url,
        cookies: &[Cookie],
    ) -> Result<(), HttpError> {
        if !is_web_url(url) || cookies.is_empty() {
            return Ok(());
        }
        let _: Ack = self
            .invoke("SetCookies", meta, url, cookies.to_vec())
            .await?;
        Ok(())
    }

    async fn clear(&self, meta: &RequestMeta, url: &Url) -> Result<(), HttpError> {
        if !is_web_url(url) {
            return Ok(());
        }
        let _: Ack = self.invoke("ClearCookies", meta, url, Vec::new()).await?;
        Ok(())
    }
}
