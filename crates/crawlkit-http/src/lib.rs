//! Transport-agnostic HTTP dispatch model for the crawl stack.
//!
//! [`Request`], [`Response`] and [`Options`] describe one fetch and the proxy
//! policy it runs under. Backends implement [`Client`] and hand out a
//! [`CookieJar`]; [`LocalCookieJar`] keeps cookies in process.
//!
//! ```
//! use crawlkit_http::{Options, Reliability, Request};
//!
//! let request = Request::get("https://example.com/").unwrap();
//! assert!(!request.has_body());
//! assert_eq!(Options::default().reliability, Reliability::Low);
//! ```

pub mod client;
pub mod cookiejar;
pub mod crawl;
pub mod error;
pub mod meta;
pub mod options;
pub mod request;
pub mod response;

pub use client::Client;
pub use cookiejar::{Cookie, CookieJar, LocalCookieJar, SameSite};
pub use crawl::CrawlOptions;
pub use error::HttpError;
pub use meta::{generate_request_id, RequestMeta};
pub use options::{Options, Reliability};
pub use request::{Request, RequestBody};
pub use response::{RedirectChain, Response, ResponseBody};

// Re-exported so downstream crates build requests without a direct `reqwest` dependency.
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode, Url, Version};
