use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Default,
    Lax,
    Strict,
    None,
}

/// A single cookie as stored by a jar or carried on the session wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: SameSite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    /// Seconds to live. Positive values override `expires`; zero or negative
    /// values mean the cookie is already expired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
}

impl Cookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// When the cookie stops being valid, relative to `now`.
    ///
    /// A positive `max_age` wins over `expires`. `None` means a session cookie.
    #[must_use]
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.max_age {
            Some(secs) if secs > 0 => Some(now + Duration::seconds(secs)),
            Some(_) => Some(now),
            None => self.expires,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at(now).is_some_and(|at| at <= now)
    }

    /// `name=value` pair as sent in a `Cookie` request header.
    #[must_use]
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    /// Renders the cookie as a `Set-Cookie` header value.
    #[must_use]
    pub fn to_set_cookie_string(&self) -> String {
        let mut line = self.pair();
        if !self.domain.is_empty() {
            let _ = write!(line, "; Domain={}", self.domain);
        }
        if !self.path.is_empty() {
            let _ = write!(line, "; Path={}", self.path);
        }
        if let Some(max_age) = self.max_age {
            let _ = write!(line, "; Max-Age={max_age}");
        } else if let Some(expires) = self.expires {
            let _ = write!(
                line,
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            );
        }
        if self.http_only {
            line.push_str("; HttpOnly");
        }
        if self.secure {
            line.push_str("; Secure");
        }
        match self.same_site {
            SameSite::Default => {}
            SameSite::Lax => line.push_str("; SameSite=Lax"),
            SameSite::Strict => line.push_str("; SameSite=Strict"),
            SameSite::None => line.push_str("; SameSite=None"),
        }
        line
    }

    /// Parses a `Cookie` request header (`a=1; b=2`) into name/value cookies.
    #[must_use]
    pub fn parse_header(header: &str) -> Vec<Cookie> {
        header
            .split(';')
            .filter_map(|part| {
                let (name, value) = part.trim().split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| Cookie::new(name, value.trim()))
            })
            .collect()
    }
}
