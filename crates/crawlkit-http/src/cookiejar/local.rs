use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;

use super::{Cookie, CookieJar};
use crate::error::HttpError;
use crate::meta::RequestMeta;

/// In-process jar backed by reqwest's public-suffix aware cookie store.
///
/// The store only exposes the `Cookie` header it would send, so
/// [`CookieJar::cookies`] returns name/value pairs without attributes.
#[derive(Debug, Clone, Default)]
pub struct LocalCookieJar {
    store: Arc<Jar>,
}

impl LocalCookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing store, e.g. one also installed on a `reqwest::Client`.
    #[must_use]
    pub fn with_store(store: Arc<Jar>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> Arc<Jar> {
        Arc::clone(&self.store)
    }

    fn stored(&self, url: &Url) -> Vec<Cookie> {
        self.store
            .cookies(url)
            .and_then(|header| header.to_str().ok().map(Cookie::parse_header))
            .unwrap_or_default()
    }
}

/// Bounds the expire-and-recheck loop in [`CookieJar::clear`].
const MAX_CLEAR_PASSES: usize = 3;

/// `Domain` attributes a cookie visible to `url` may have been stored under:
/// empty for host-only, then the host and each parent domain with at least
/// two labels. IP hosts only carry host-only cookies.
fn domain_candidates(url: &Url) -> Vec<String> {
    let mut domains = vec![String::new()];
    let Some(host) = url.domain() else {
        return domains;
    };
    let host = host.trim_end_matches('.');
    let mut rest = host;
    while rest.contains('.') {
        domains.push(rest.to_owned());
        match rest.split_once('.') {
            Some((_, parent)) => rest = parent,
            None => break,
        }
    }
    domains
}

/// Every path a cookie visible to `url` may have been stored under: `/`,
/// each ancestor segment boundary, and the full path.
fn path_candidates(url: &Url) -> Vec<String> {
    let path = url.path();
    let mut paths = vec!["/".to_owned()];
    for (idx, _) in path.match_indices('/').filter(|(idx, _)| *idx > 0) {
        paths.push(path[..idx].to_owned());
    }
    if path != "/" && !paths.iter().any(|p| p == path) {
        paths.push(path.to_owned());
    }
    paths
}

#[async_trait]
impl CookieJar for LocalCookieJar {
    async fn cookies(&self, _meta: &RequestMeta, url: &Url) -> Result<Vec<Cookie>, HttpError> {
        Ok(self.stored(url))
    }

    async fn set_cookies(
        &self,
        _meta: &RequestMeta,
        url: &Url,
        cookies: &[Cookie],
    ) -> Result<(), HttpError> {
        for cookie in cookies {
            self.store.add_cookie_str(&cookie.to_set_cookie_string(), url);
        }
        Ok(())
    }

    /// The store has no delete primitive: every visible cookie name is
    /// re-submitted already expired under each domain and path it could be
    /// stored at, which evicts the matching entry. Fails with
    /// [`HttpError::Jar`] if cookies are still visible after a few passes.
    async fn clear(&self, _meta: &RequestMeta, url: &Url) -> Result<(), HttpError> {
        let domains = domain_candidates(url);
        let paths = path_candidates(url);

        for pass in 1..=MAX_CLEAR_PASSES {
            let names: BTreeSet<String> =
                self.stored(url).into_iter().map(|c| c.name).collect();
            if names.is_empty() {
                return Ok(());
            }
            tracing::debug!(url = %url, pass, count = names.len(), "clearing local cookies");

            for name in &names {
                for domain in &domains {
                    for path in &paths {
                        let expired = Cookie {
                            domain: domain.clone(),
                            path: path.clone(),
                            max_age: Some(-1),
                            ..Cookie::new(name.clone(), "")
                        };
                        self.store.add_cookie_str(&expired.to_set_cookie_string(), url);
                    }
                }
            }
        }

        let left = self.stored(url);
        if left.is_empty() {
            return Ok(());
        }
        tracing::warn!(url = %url, count = left.len(), "cookies survived clearing");
        Err(HttpError::Jar(format!(
            "{} cookies for {url} survived {MAX_CLEAR_PASSES} clearing passes",
            left.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn path_candidates_cover_every_ancestor() {
        assert_eq!(path_candidates(&url("https://example.com")), vec!["/"]);
        assert_eq!(path_candidates(&url("https://example.com/x")), vec!["/", "/x"]);
        assert_eq!(
            path_candidates(&url("https://example.com/a/b/c")),
            vec!["/", "/a", "/a/b", "/a/b/c"]
        );
        assert_eq!(
            path_candidates(&url("https://example.com/a/b/")),
            vec!["/", "/a", "/a/b", "/a/b/"]
        );
    }

    #[test]
    fn domain_candidates_walk_parent_domains() {
        assert_eq!(
            domain_candidates(&url("https://www.shop.example.com/")),
            vec!["", "www.shop.example.com", "shop.example.com", "example.com"]
        );
        assert_eq!(domain_candidates(&url("http://localhost/")), vec![""]);
        assert_eq!(domain_candidates(&url("http://127.0.0.1:8080/")), vec![""]);
    }

    #[tokio::test]
    async fn set_then_get_round_trips_name_and_value() {
        let jar = LocalCookieJar::new();
        let meta = RequestMeta::new();
        let u = url("https://example.com/x");

        jar.set_cookies(&meta, &u, &[Cookie::new("a", "1")])
            .await
            .unwrap();

        let cookies = jar.cookies(&meta, &u).await.unwrap();
        assert!(
            cookies.iter().any(|c| c.name == "a" && c.value == "1"),
            "got {cookies:?}"
        );
    }

    #[tokio::test]
    async fn clear_removes_cookies_for_url() {
        let jar = LocalCookieJar::new();
        let meta = RequestMeta::new();
        let u = url("https://example.com/x");

        jar.set_cookies(&meta, &u, &[Cookie::new("a", "1"), Cookie::new("b", "2")])
            .await
            .unwrap();
        jar.clear(&meta, &u).await.unwrap();

        let cookies = jar.cookies(&meta, &u).await.unwrap();
        assert!(
            !cookies.iter().any(|c| c.name == "a"),
            "cookie a should be gone: {cookies:?}"
        );
        assert!(cookies.is_empty(), "got {cookies:?}");
    }

    #[tokio::test]
    async fn clear_removes_parent_domain_cookie() {
        let jar = LocalCookieJar::new();
        let meta = RequestMeta::new();
        let u = url("https://www.example.com/");
        let shared = Cookie {
            domain: "example.com".to_owned(),
            ..Cookie::new("sid", "1")
        };

        jar.set_cookies(&meta, &u, &[shared, Cookie::new("local", "2")])
            .await
            .unwrap();
        assert_eq!(jar.cookies(&meta, &u).await.unwrap().len(), 2);

        jar.clear(&meta, &u).await.unwrap();

        assert!(jar.cookies(&meta, &u).await.unwrap().is_empty());
        let sibling = jar
            .cookies(&meta, &url("https://api.example.com/"))
            .await
            .unwrap();
        assert!(sibling.is_empty(), "domain cookie survived: {sibling:?}");
    }

    #[tokio::test]
    async fn clear_removes_ancestor_path_cookie() {
        let jar = LocalCookieJar::new();
        let meta = RequestMeta::new();
        let u = url("https://example.com/a/b/c");
        let scoped = Cookie {
            path: "/a".to_owned(),
            ..Cookie::new("section", "1")
        };

        jar.set_cookies(&meta, &u, &[scoped]).await.unwrap();
        assert_eq!(jar.cookies(&meta, &u).await.unwrap().len(), 1);

        jar.clear(&meta, &u).await.unwrap();

        assert!(jar.cookies(&meta, &u).await.unwrap().is_empty());
        assert!(jar
            .cookies(&meta, &url("https://example.com/a"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn clear_on_empty_jar_is_ok() {
        let jar = LocalCookieJar::new();
        jar.clear(&RequestMeta::new(), &url("https://example.com/"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cookies_are_scoped_to_host() {
        let jar = LocalCookieJar::new();
        let meta = RequestMeta::new();
        jar.set_cookies(&meta, &url("https://shop.example.com/"), &[Cookie::new("a", "1")])
            .await
            .unwrap();

        let other = jar
            .cookies(&meta, &url("https://other.example.org/"))
            .await
            .unwrap();
        assert!(other.is_empty(), "got {other:?}");
    }

    #[tokio::test]
    async fn already_expired_cookie_is_not_stored() {
        let jar = LocalCookieJar::new();
        let meta = RequestMeta::new();
        let u = url("https://example.com/");
        let expired = Cookie {
            max_age: Some(-1),
            ..Cookie::new("gone", "1")
        };
        jar.set_cookies(&meta, &u, &[expired]).await.unwrap();
        assert!(jar.cookies(&meta, &u).await.unwrap().is_empty());
    }
}
