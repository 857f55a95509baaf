//! JSON messages exchanged with the proxy-manager and session-manager services.

use std::collections::BTreeMap;

use crawlkit_http::{Cookie, Reliability};
use serde::{Deserialize, Serialize};

/// Bodies travel as standard base64 strings; an empty string is no body.
mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        body: &[u8],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| serde::de::Error::custom(format!("body is not base64: {e}")))
    }
}

/// Header multimap on the wire: every name maps to all of its values.
pub type WireHeaders = BTreeMap<String, Vec<String>>;

/// `ProxyManager/Do` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    #[serde(default)]
    pub tracing_id: String,
    #[serde(default)]
    pub job_id: String,
    pub req_id: String,
    pub method: String,
    pub url: String,
    #[serde(default, with = "base64_body")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub headers: WireHeaders,
    pub options: WireOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOptions {
    pub enable_proxy: bool,
    pub reliability: Reliability,
    pub enable_headless: bool,
    pub enable_session_init: bool,
    pub keep_session: bool,
    pub disable_cookie_jar: bool,
    /// Seconds the remote side may spend on this request end to end.
    pub max_ttl_per_request: u64,
    pub disable_redirect: bool,
    #[serde(default)]
    pub request_filter_keys: Vec<String>,
    /// Milliseconds the headless renderer waits for scripts; 0 means its default.
    #[serde(default)]
    pub js_wait_duration_ms: u64,
}

/// `ProxyManager/Do` reply, also used for every nested upstream hop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyReply {
    pub status_code: i32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub proto: String,
    #[serde(default)]
    pub proto_major: i32,
    #[serde(default)]
    pub proto_minor: i32,
    #[serde(default)]
    pub headers: WireHeaders,
    #[serde(default, with = "base64_body")]
    pub body: Vec<u8>,
    /// Request that produced this hop, present when the proxy followed redirects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Box<WireRequest>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: WireHeaders,
    /// The previous hop's response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Box<ProxyReply>>,
}

/// Session-manager cookie request; `cookies` is only sent by `SetCookies`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCookiesRequest {
    #[serde(default)]
    pub tracing_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<Cookie>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCookiesReply {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
}

/// Empty acknowledgement returned by mutating session calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {}
