//! Dispatch through a hosted crawling-API gateway.
//!
//! The gateway takes the target URL and the caller's headers as query
//! parameters and answers with the upstream response, its headers renamed
//! with an `original_` prefix. [`GatewayClient`] turns that back into a
//! [`Response`] shaped exactly like the proxy client's.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crawlkit_core::AppConfig;
use crawlkit_http::response::status_line;
use crawlkit_http::{
    Client, CookieJar, HeaderMap, HeaderName, HeaderValue, HttpError, Method, Options, Request,
    Response, ResponseBody, StatusCode, Url,
};
use reqwest::header::COOKIE;
use reqwest::redirect::Policy;

use crate::reconstruct::strip_decoded_body_headers;
use crate::rpc::within_deadline;

pub use crawlkit_core::DEFAULT_GATEWAY_BASE_URL;

const ORIGINAL_PREFIX: &str = "original_";
const ORIGINAL_STATUS: &str = "original_status";
const PC_STATUS: &str = "pc_status";

/// Gateway endpoint and credentials.
#[derive(Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_token: String,
    /// Token for JavaScript-rendered (headless) requests.
    pub js_token: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_BASE_URL.to_owned(),
            api_token: api_token.into(),
            js_token: None,
            timeout: Duration::from_secs(330),
            connect_timeout: Duration::from_secs(10),
            user_agent: "crawlkit/0.1 (dispatch)".to_owned(),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.gateway_base_url.clone(),
            api_token: config.gateway_api_token.clone().unwrap_or_default(),
            js_token: config.gateway_js_token.clone(),
            timeout: Duration::from_secs(config.transport_timeout_secs),
            connect_timeout: Duration::from_secs(config.rpc_connect_timeout_secs),
            user_agent: config.user_agent.clone(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"[redacted]")
            .field("js_token", &self.js_token.as_ref().map(|_| "[redacted]"))
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// A [`Client`] backed by the crawling-API gateway.
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: Url,
    api_token: String,
    js_token: Option<String>,
    jar: Arc<dyn CookieJar>,
}

impl GatewayClient {
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidArgument`] if the API token is empty or
    /// the base URL does not parse, or [`HttpError::Transport`] if the
    /// underlying `reqwest::Client` cannot be constructed.
    pub fn new(config: GatewayConfig, jar: Arc<dyn CookieJar>) -> Result<Self, HttpError> {
        if config.api_token.trim().is_empty() {
            return Err(HttpError::InvalidArgument(
                "gateway API token is empty".to_owned(),
            ));
        }

        let normalised = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| {
            HttpError::InvalidArgument(format!(
                "invalid gateway base URL '{}': {e}",
                config.base_url
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token,
            js_token: config.js_token.filter(|t| !t.trim().is_empty()),
            jar,
        })
    }

    /// The gateway URL for `request`. Empty optional parameters are omitted.
    fn build_url(&self, request: &Request, options: &Options) -> Result<Url, HttpError> {
        let token = if options.enable_headless {
            self.js_token.as_deref().ok_or_else(|| {
                HttpError::InvalidArgument(
                    "headless dispatch needs a gateway JS token".to_owned(),
                )
            })?
        } else {
            self.api_token.as_str()
        };

        let cookies = cookie_header(&request.headers);
        let request_headers = flatten_headers(&request.headers);

        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("token", token);
            pairs.append_pair("url", request.url.as_str());
            if !cookies.is_empty() {
                pairs.append_pair("cookies", &cookies);
            }
            if !request_headers.is_empty() {
                pairs.append_pair("request_headers", &request_headers);
            }
            pairs.append_pair("get_headers", "true");
            pairs.append_pair("get_cookies", "true");
            pairs.append_pair("device", "desktop");
            if options.enable_headless {
                if let Some(wait) = options.js_wait_duration {
                    pairs.append_pair("page_wait", &wait.as_millis().to_string());
                }
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        request: &Request,
        url: Url,
    ) -> Result<(reqwest::StatusCode, reqwest::Version, HeaderMap, Vec<u8>), HttpError> {
        let mut builder = self.client.get(url);
        if let Some(remaining) = request.meta.remaining(Instant::now()) {
            builder = builder.timeout(remaining);
        }

        let response = builder.send().await?;
        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok((status, version, headers, body))
    }
}

#[async_trait]
impl Client for GatewayClient {
    async fn do_with_options(
        &self,
        request: Request,
        options: &Options,
    ) -> Result<Response, HttpError> {
        ensure_plain_get(&request)?;
        let url = self.build_url(&request, options)?;

        tracing::debug!(
            req_id = request.meta.req_id.as_deref().unwrap_or(""),
            tracing_id = request.meta.tracing_id.as_deref().unwrap_or(""),
            url = %request.url,
            headless = options.enable_headless,
            "dispatching request through gateway"
        );

        let (gateway_status, version, gateway_headers, body) =
            match within_deadline(request.meta.deadline, self.send(&request, url)).await {
                Ok(parts) => parts,
                Err(e) => {
                    tracing::warn!(url = %request.url, error = %e, "gateway call failed");
                    return Err(e);
                }
            };

        if let Some(pc_status) = header_str(&gateway_headers, PC_STATUS) {
            let code = pc_status.trim().parse::<i32>().unwrap_or(0);
            if code != 200 {
                tracing::warn!(url = %request.url, status = code, "gateway reported a non-success status");
                return Err(HttpError::RemoteStatus {
                    code,
                    status: reason_for(code, pc_status),
                });
            }
        } else if !gateway_status.is_success() {
            return Err(HttpError::TransportStatus {
                status: gateway_status.as_u16(),
                url: self.base_url.to_string(),
            });
        }

        let status = match header_str(&gateway_headers, ORIGINAL_STATUS) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .ok()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or_else(|| {
                    HttpError::InvalidReply(format!("gateway original_status '{raw}'"))
                })?,
            None => gateway_status,
        };

        let mut headers = unprefix_original_headers(&gateway_headers);
        let uncompressed = !body.is_empty();
        if uncompressed {
            strip_decoded_body_headers(&mut headers);
        }

        tracing::debug!(
            url = %request.url,
            status = status.as_u16(),
            body_len = body.len(),
            "gateway replied"
        );

        Ok(Response {
            status,
            status_text: status_line(status),
            proto: format!("{version:?}"),
            version,
            headers,
            content_length: Some(body.len() as u64),
            body: ResponseBody::new(body),
            uncompressed,
            request: Some(Box::new(request)),
        })
    }

    fn cookie_jar(&self) -> Arc<dyn CookieJar> {
        Arc::clone(&self.jar)
    }
}

/// The gateway only fetches: it has no parameter for a method or a body.
fn ensure_plain_get(request: &Request) -> Result<(), HttpError> {
    if request.method != Method::GET {
        return Err(HttpError::InvalidArgument(format!(
            "gateway only issues GET, got {} for {}",
            request.method, request.url
        )));
    }
    if request.has_body() {
        return Err(HttpError::InvalidArgument(format!(
            "gateway cannot forward a request body for {}",
            request.url
        )));
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn reason_for(code: i32, raw: &str) -> String {
    u16::try_from(code)
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .map_or_else(|| format!("gateway status {}", raw.trim()), status_line)
}

/// The request's `Cookie` header values joined into one cookie string.
fn cookie_header(headers: &HeaderMap) -> String {
    headers
        .get_all(COOKIE)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every non-cookie header as `name:value`, joined with `|`.
pub(crate) fn flatten_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .filter(|(name, _)| *name != COOKIE)
        .map(|(name, value)| format!("{}:{}", name, String::from_utf8_lossy(value.as_bytes())))
        .collect::<Vec<_>>()
        .join("|")
}

/// Upstream headers from the gateway's `original_*` copies.
///
/// Only the prefix is removed. Upstream names that themselves contain
/// underscores come back unchanged, so `original_x_trace` stays `x_trace`.
pub(crate) fn unprefix_original_headers(gateway: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in gateway {
        let Some(upstream) = name.as_str().strip_prefix(ORIGINAL_PREFIX) else {
            continue;
        };
        if name.as_str() == ORIGINAL_STATUS || upstream.is_empty() {
            continue;
        }
        match HeaderName::from_bytes(upstream.as_bytes()) {
            Ok(upstream_name) => {
                headers.append(upstream_name, HeaderValue::clone(value));
            }
            Err(_) => {
                tracing::debug!(header = %name, "skipping invalid upstream header name");
            }
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use crawlkit_http::LocalCookieJar;

    use super::*;

    fn client(js_token: Option<&str>) -> GatewayClient {
        let mut config = GatewayConfig::new("api-token");
        config.base_url = "https://gateway.local".to_owned();
        config.js_token = js_token.map(str::to_owned);
        GatewayClient::new(config, Arc::new(LocalCookieJar::new())).unwrap()
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn new_rejects_empty_token() {
        let err = GatewayClient::new(GatewayConfig::new("  "), Arc::new(LocalCookieJar::new()))
            .err()
            .expect("empty token");
        assert!(matches!(err, HttpError::InvalidArgument(_)), "got {err:?}");
    }

    #[test]
    fn default_config_points_at_the_shared_base_url() {
        let config = GatewayConfig::new("t");
        assert_eq!(config.base_url, crawlkit_core::DEFAULT_GATEWAY_BASE_URL);
        assert_eq!(config.base_url, DEFAULT_GATEWAY_BASE_URL);
    }

    #[test]
    fn only_bodiless_get_requests_are_accepted() {
        assert!(ensure_plain_get(&Request::get("https://shop.example.com/").unwrap()).is_ok());

        let post = Request::new("POST", "https://shop.example.com/api", Some("q=1".into())).unwrap();
        let err = ensure_plain_get(&post).unwrap_err();
        assert!(matches!(err, HttpError::InvalidArgument(_)), "got {err:?}");

        let get_with_body =
            Request::new("GET", "https://shop.example.com/api", Some("q=1".into())).unwrap();
        let err = ensure_plain_get(&get_with_body).unwrap_err();
        assert!(err.to_string().contains("body"), "got {err}");
    }

    #[test]
    fn new_rejects_bad_base_url() {
        let mut config = GatewayConfig::new("t");
        config.base_url = "not a url".to_owned();
        let err = GatewayClient::new(config, Arc::new(LocalCookieJar::new()))
            .err()
            .expect("bad url");
        assert!(matches!(err, HttpError::InvalidArgument(_)), "got {err:?}");
    }

    #[test]
    fn build_url_encodes_target_headers_and_cookies() {
        let mut req = Request::get("https://shop.example.com/p?id=1&x=2").unwrap();
        req.headers
            .insert("accept", HeaderValue::from_static("text/html"));
        req.headers
            .insert(COOKIE, HeaderValue::from_static("a=1; b=2"));

        let url = client(None).build_url(&req, &Options::default()).unwrap();
        let pairs = query(&url);

        assert_eq!(url.host_str(), Some("gateway.local"));
        assert!(pairs.contains(&("token".into(), "api-token".into())));
        assert!(pairs.contains(&("url".into(), "https://shop.example.com/p?id=1&x=2".into())));
        assert!(pairs.contains(&("cookies".into(), "a=1; b=2".into())));
        assert!(pairs.contains(&("request_headers".into(), "accept:text/html".into())));
        assert!(pairs.contains(&("get_headers".into(), "true".into())));
        assert!(pairs.contains(&("get_cookies".into(), "true".into())));
        assert!(pairs.contains(&("device".into(), "desktop".into())));
    }

    #[test]
    fn build_url_omits_empty_optional_params() {
        let req = Request::get("https://shop.example.com/").unwrap();
        let url = client(None).build_url(&req, &Options::default()).unwrap();
        let names: Vec<String> = query(&url).into_iter().map(|(k, _)| k).collect();
        assert!(!names.contains(&"cookies".to_owned()));
        assert!(!names.contains(&"request_headers".to_owned()));
        assert!(!names.contains(&"page_wait".to_owned()));
    }

    #[test]
    fn headless_uses_js_token_and_page_wait() {
        let req = Request::get("https://shop.example.com/").unwrap();
        let options = Options {
            enable_headless: true,
            js_wait_duration: Some(Duration::from_secs(3)),
            ..Options::default()
        };
        let url = client(Some("js-token")).build_url(&req, &options).unwrap();
        let pairs = query(&url);
        assert!(pairs.contains(&("token".into(), "js-token".into())));
        assert!(pairs.contains(&("page_wait".into(), "3000".into())));
    }

    #[test]
    fn headless_without_js_token_is_invalid() {
        let req = Request::get("https://shop.example.com/").unwrap();
        let options = Options {
            enable_headless: true,
            ..Options::default()
        };
        let err = client(None).build_url(&req, &options).unwrap_err();
        assert!(matches!(err, HttpError::InvalidArgument(_)), "got {err:?}");
    }

    #[test]
    fn flatten_headers_skips_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("spider/1.0"));
        headers.insert("accept-language", HeaderValue::from_static("en"));
        headers.insert(COOKIE, HeaderValue::from_static("a=1"));
        let flat = flatten_headers(&headers);
        let mut parts: Vec<&str> = flat.split('|').collect();
        parts.sort_unstable();
        assert_eq!(parts, vec!["accept-language:en", "user-agent:spider/1.0"]);
    }

    #[test]
    fn unprefix_keeps_only_original_headers() {
        let mut gateway = HeaderMap::new();
        gateway.insert("pc_status", HeaderValue::from_static("200"));
        gateway.insert("original_status", HeaderValue::from_static("404"));
        gateway.insert("original_content-type", HeaderValue::from_static("text/html"));
        gateway.append("original_set-cookie", HeaderValue::from_static("a=1"));
        gateway.append("original_set-cookie", HeaderValue::from_static("b=2"));
        gateway.insert("original_x_trace", HeaderValue::from_static("abc"));
        gateway.insert("content-length", HeaderValue::from_static("10"));

        let headers = unprefix_original_headers(&gateway);

        assert_eq!(headers["content-type"], "text/html");
        assert_eq!(headers.get_all("set-cookie").iter().count(), 2);
        assert_eq!(headers["x_trace"], "abc");
        assert!(headers.get("status").is_none());
        assert!(headers.get("pc_status").is_none());
        assert!(headers.get("content-length").is_none());
    }
}
