//! Spider-level crawl settings applied to every outgoing request.

use reqwest::header::{HeaderMap, HeaderValue, COOKIE};

use crate::cookiejar::Cookie;
use crate::options::{Options, Reliability};
use crate::request::Request;

/// Settings a spider declares once and reads for every request it issues.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    pub enable_headless: bool,
    pub login_required: bool,
    /// Headers every request must carry.
    pub must_headers: HeaderMap,
    /// Cookies every request must carry.
    pub must_cookies: Vec<Cookie>,
    pub reliability: Reliability,
}

impl CrawlOptions {
    /// Base dispatch policy for this spider's requests.
    #[must_use]
    pub fn options(&self) -> Options {
        Options {
            enable_proxy: true,
            reliability: self.reliability,
            enable_headless: self.enable_headless,
            ..Options::default()
        }
    }

    /// Adds the must-have headers and cookies to `request`.
    ///
    /// Headers the request already sets win over the spider defaults. Cookies
    /// are merged into the `Cookie` header; a cookie name already present is
    /// left untouched.
    pub fn prepare_request(&self, request: &mut Request) {
        for name in self.must_headers.keys() {
            if request.headers.contains_key(name) {
                continue;
            }
            for value in self.must_headers.get_all(name) {
                request.headers.append(name.clone(), value.clone());
            }
        }

        if self.must_cookies.is_empty() {
            return;
        }

        let existing: Vec<String> = request
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_owned)
            .collect();
        let present: Vec<Cookie> = existing
            .iter()
            .flat_map(|header| Cookie::parse_header(header))
            .collect();

        let mut pairs: Vec<String> = present.iter().map(Cookie::pair).collect();
        for cookie in &self.must_cookies {
            if !present.iter().any(|c| c.name == cookie.name) {
                pairs.push(cookie.pair());
            }
        }

        match HeaderValue::from_str(&pairs.join("; ")) {
            Ok(value) => {
                request.headers.insert(COOKIE, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %request.url, "must-have cookies are not a valid header value");
            }
        }
    }
}
