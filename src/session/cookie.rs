//! Cookie model shared by the store, the bridge and the socket handshake.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use url::Url;

// ============================================================================
// Cookie
// ============================================================================

/// HTTP cookie with the attributes the store needs for matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Secure flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    /// HttpOnly flag.
    #[serde(rename = "httpOnly", skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// Expiration timestamp (seconds since the Unix epoch).
    #[serde(rename = "expirationDate", skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
}

impl Cookie {
    /// Creates a session cookie with name and value.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            secure: None,
            http_only: None,
            expiration_date: None,
        }
    }

    /// Sets the domain.
    #[inline]
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the secure flag.
    #[inline]
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Sets the httpOnly flag.
    #[inline]
    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = Some(http_only);
        self
    }

    /// Sets the expiration date.
    #[inline]
    #[must_use]
    pub fn with_expiration_date(mut self, expiration_date: f64) -> Self {
        self.expiration_date = Some(expiration_date);
        self
    }

    /// Converts a `Set-Cookie` from a response.
    ///
    /// A cookie without a `Domain` attribute belongs to `default_host`.
    #[must_use]
    pub fn from_response(cookie: &reqwest::cookie::Cookie<'_>, default_host: &str) -> Self {
        let expiration_date = cookie
            .max_age()
            .map(|max_age| SystemTime::now() + max_age)
            .or_else(|| cookie.expires())
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
            .map(|since| since.as_secs_f64());

        Self {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            domain: Some(
                cookie
                    .domain()
                    .map_or_else(|| default_host.to_string(), normalize_domain),
            ),
            path: cookie.path().map(str::to_string),
            secure: cookie.secure().then_some(true),
            http_only: cookie.http_only().then_some(true),
            expiration_date,
        }
    }

    /// Returns `true` if the cookie expired before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expiration_date.is_some_and(|expires| {
            let now = now
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_secs_f64();
            expires <= now
        })
    }

    /// Returns `true` if the cookie should be sent to `url`.
    #[must_use]
    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };

        let domain_ok = self
            .domain
            .as_deref()
            .is_none_or(|domain| domain_matches(host, domain));

        let path_ok = self
            .path
            .as_deref()
            .is_none_or(|path| path_matches(url.path(), path));

        let secure_ok =
            !self.secure.unwrap_or(false) || matches!(url.scheme(), "https" | "wss");

        domain_ok && path_ok && secure_ok && !self.is_expired_at(SystemTime::now())
    }

    /// Returns `true` if `other` would overwrite this cookie in a jar.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name
            && self.domain.as_deref().map(normalize_domain)
                == other.domain.as_deref().map(normalize_domain)
            && self.path.as_deref().unwrap_or("/") == other.path.as_deref().unwrap_or("/")
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds a `Cookie` header value, or `None` for an empty list.
#[must_use]
pub fn cookie_header(cookies: &[Cookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }

    Some(
        cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Lowercases a domain and strips a leading dot.
fn normalize_domain(domain: &str) -> String {
    domain.trim_start_matches('.').to_ascii_lowercase()
}

/// RFC 6265 domain match.
fn domain_matches(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = normalize_domain(domain);

    host == domain
        || (host.ends_with(&domain) && host[..host.len() - domain.len()].ends_with('.'))
}

/// RFC 6265 path match.
fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path[cookie_path.len()..].starts_with('/')))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("url")
    }

    #[test]
    fn test_cookie_header() {
        assert_eq!(cookie_header(&[]), None);

        let cookies = [Cookie::new("a", "1"), Cookie::new("b", "2")];
        assert_eq!(cookie_header(&cookies).as_deref(), Some("a=1; b=2"));
    }

    #[test]
    fn test_domain_matching() {
        let cookie = Cookie::new("s", "v").with_domain("example.com");
        assert!(cookie.matches(&url("https://example.com/")));
        assert!(cookie.matches(&url("https://api.example.com/x")));
        assert!(!cookie.matches(&url("https://badexample.com/")));
        assert!(!cookie.matches(&url("https://other.org/")));

        let dotted = Cookie::new("s", "v").with_domain(".Example.com");
        assert!(dotted.matches(&url("wss://ws.example.com/wss/")));
    }

    #[test]
    fn test_path_matching() {
        let cookie = Cookie::new("s", "v").with_path("/api");
        assert!(cookie.matches(&url("https://h/api")));
        assert!(cookie.matches(&url("https://h/api/v1/init")));
        assert!(!cookie.matches(&url("https://h/apix")));
        assert!(!cookie.matches(&url("https://h/")));
    }

    #[test]
    fn test_secure_requires_tls_scheme() {
        let cookie = Cookie::new("s", "v").with_secure(true);
        assert!(cookie.matches(&url("https://h/")));
        assert!(cookie.matches(&url("wss://h/")));
        assert!(!cookie.matches(&url("http://h/")));
        assert!(!cookie.matches(&url("ws://h/")));
    }

    #[test]
    fn test_expiry() {
        let expired = Cookie::new("s", "v").with_expiration_date(1.0);
        assert!(!expired.matches(&url("https://h/")));

        let later = SystemTime::now() + Duration::from_secs(3600);
        let secs = later.duration_since(UNIX_EPOCH).expect("epoch").as_secs_f64();
        let fresh = Cookie::new("s", "v").with_expiration_date(secs);
        assert!(fresh.matches(&url("https://h/")));
    }

    #[test]
    fn test_same_identity_ignores_value() {
        let a = Cookie::new("s", "1").with_domain("h.com");
        let b = Cookie::new("s", "2").with_domain(".h.com").with_path("/");
        let c = Cookie::new("s", "2").with_domain("h.com").with_path("/other");
        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
    }

    #[test]
    fn test_serde_uses_camel_case_attributes() {
        let cookie = Cookie::new("s", "v").with_http_only(true);
        let json = serde_json::to_string(&cookie).expect("serialize");
        assert_eq!(json, r#"{"name":"s","value":"v","httpOnly":true}"#);
    }
}
