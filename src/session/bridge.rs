//! Exchanges the HTTP session for a socket session cookie.
//!
//! # Flow
//!
//! 1. `load_and_lock` the cookies for the init URL
//! 2. Call the init endpoint with those cookies
//! 3. Serialize `result` from the response body into a token
//! 4. Take `PHPSESSID` from the response, else from the loaded cookies
//! 5. Derive `WSSESSID = token` for the socket host
//! 6. `save_and_unlock` for the socket URL, whatever happened before
//!
//! The steps run on their own task, so dropping or timing out the caller
//! cannot skip step 6.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use reqwest::header::COOKIE;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::endpoints::Endpoints;
use crate::error::{Error, Result};

use super::cookie::{Cookie, cookie_header};
use super::store::CookieStore;

// ============================================================================
// Constants
// ============================================================================

/// Session cookie issued by the HTTP API.
pub const API_SESSION_COOKIE: &str = "PHPSESSID";

/// Session cookie the socket server expects.
pub const SOCKET_SESSION_COOKIE: &str = "WSSESSID";

// ============================================================================
// SessionBridge
// ============================================================================

/// One-shot session exchange against the init endpoint.
#[derive(Clone)]
pub struct SessionBridge {
    http: reqwest::Client,
    endpoints: Endpoints,
    store: Arc<dyn CookieStore>,
    body: Option<Value>,
}

impl SessionBridge {
    /// Creates a bridge that issues a `GET` to the init endpoint.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoints: Endpoints, store: Arc<dyn CookieStore>) -> Self {
        Self {
            http,
            endpoints,
            store,
            body: None,
        }
    }

    /// Sends `body` as JSON with a `POST` instead.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Runs the exchange and stores the derived socket cookie.
    ///
    /// The init lock taken at the start is always released, even if this
    /// future is dropped before it completes. On failure an empty cookie
    /// list is saved and the original error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] if the request fails or the body is not JSON
    /// - [`Error::SessionBridge`] if the body has no `result` object or the
    ///   exchange task panicked
    /// - [`Error::MissingCookie`] if no API session cookie is available
    pub async fn run(&self) -> Result<Cookie> {
        let bridge = self.clone();

        tokio::spawn(async move { bridge.run_locked().await })
            .await
            .map_err(|e| Error::session_bridge(format!("Session init task failed: {e}")))?
    }

    /// Load, exchange and save inside the init lock.
    async fn run_locked(&self) -> Result<Cookie> {
        let api_url = self.endpoints.init_url();
        let socket_url = self.endpoints.socket_url();

        let (loaded, lock) = self.store.load_and_lock(api_url).await?;
        debug!(url = %api_url, cookies = loaded.len(), "Session init started");

        let outcome = self.exchange(&loaded).await;

        let to_save = match &outcome {
            Ok(cookie) => vec![cookie.clone()],
            Err(_) => Vec::new(),
        };

        if let Err(e) = self.store.save_and_unlock(socket_url, to_save, lock).await {
            warn!(error = %e, "Failed to save socket session");
            if outcome.is_ok() {
                return Err(e);
            }
        }

        match &outcome {
            Ok(cookie) => info!(domain = ?cookie.domain, "Socket session established"),
            Err(e) => warn!(error = %e, "Session init failed"),
        }

        outcome
    }

    /// Performs the HTTP call and derives the socket cookie.
    async fn exchange(&self, loaded: &[Cookie]) -> Result<Cookie> {
        let url = self.endpoints.init_url().clone();

        let mut request = match &self.body {
            Some(body) => self.http.post(url).json(body),
            None => self.http.get(url),
        };

        if let Some(header) = cookie_header(loaded) {
            request = request.header(COOKIE, header);
        }

        let response = request.send().await?;
        let status = response.status();

        let api_host = self.endpoints.api_host();
        let received: Vec<Cookie> = response
            .cookies()
            .map(|cookie| Cookie::from_response(&cookie, api_host))
            .collect();

        let body: Value = response.json().await?;
        let token = extract_token(&body).map_err(|e| match e {
            Error::SessionBridge { message } => {
                Error::session_bridge(format!("{message} (status {status})"))
            }
            other => other,
        })?;

        let api_cookie = received
            .iter()
            .chain(loaded)
            .find(|cookie| cookie.name == API_SESSION_COOKIE)
            .ok_or_else(|| Error::missing_cookie(API_SESSION_COOKIE))?;

        Ok(derive_socket_cookie(
            api_cookie,
            token,
            self.endpoints.socket_host(),
        ))
    }
}

impl std::fmt::Debug for SessionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBridge")
            .field("endpoints", &self.endpoints)
            .field("post", &self.body.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Serializes the `result` object of an init response.
///
/// # Errors
///
/// Returns [`Error::SessionBridge`] if `result` is missing or not an object.
pub fn extract_token(body: &Value) -> Result<String> {
    match body.get("result") {
        Some(result @ Value::Object(_)) => Ok(serde_json::to_string(result)?),
        Some(_) => Err(Error::session_bridge("Init response `result` is not an object")),
        None => Err(Error::session_bridge("Init response has no `result`")),
    }
}

/// Builds the socket session cookie from the API session cookie.
///
/// Path, expiry and flags are copied; the domain becomes `socket_host`.
#[must_use]
pub fn derive_socket_cookie(api_cookie: &Cookie, token: String, socket_host: &str) -> Cookie {
    Cookie {
        name: SOCKET_SESSION_COOKIE.to_string(),
        value: token,
        domain: Some(socket_host.to_string()),
        path: api_cookie.path.clone(),
        secure: api_cookie.secure,
        http_only: api_cookie.http_only,
        expiration_date: api_cookie.expiration_date,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;
    use url::Url;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::session::MemoryCookieStore;

    fn endpoints(server: &MockServer) -> Endpoints {
        let init = Url::parse(&format!("{}/api/v1/init", server.uri())).expect("url");
        let socket = Url::parse("wss://ws.example/wss/?EIO=3&transport=websocket").expect("url");
        Endpoints::from_urls(init, socket).expect("endpoints")
    }

    fn bridge(server: &MockServer, store: &Arc<MemoryCookieStore>) -> SessionBridge {
        let store: Arc<dyn CookieStore> = store.clone();
        SessionBridge::new(reqwest::Client::new(), endpoints(server), store)
    }

    #[test]
    fn test_extract_token() {
        let body = json!({"result": {"token": "abc"}});
        assert_eq!(extract_token(&body).expect("token"), r#"{"token":"abc"}"#);

        assert!(extract_token(&json!({})).is_err());
        assert!(extract_token(&json!({"result": "abc"})).is_err());
    }

    #[test]
    fn test_derive_socket_cookie_copies_attributes() {
        let api = Cookie::new(API_SESSION_COOKIE, "X")
            .with_domain("api.example")
            .with_path("/")
            .with_secure(true)
            .with_expiration_date(2_000_000_000.0);

        let socket = derive_socket_cookie(&api, r#"{"token":"abc"}"#.to_string(), "ws.example");

        assert_eq!(socket.name, SOCKET_SESSION_COOKIE);
        assert_eq!(socket.value, r#"{"token":"abc"}"#);
        assert_eq!(socket.domain.as_deref(), Some("ws.example"));
        assert_eq!(socket.path.as_deref(), Some("/"));
        assert_eq!(socket.secure, Some(true));
        assert_eq!(socket.expiration_date, Some(2_000_000_000.0));
    }

    #[tokio::test]
    async fn test_bridge_uses_response_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/init"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Set-Cookie", "PHPSESSID=X; Path=/; Secure")
                    .set_body_json(json!({"result": {"token": "abc"}})),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCookieStore::new());
        let cookie = bridge(&server, &store).run().await.expect("bridge");

        assert_eq!(cookie.name, "WSSESSID");
        assert_eq!(cookie.value, r#"{"token":"abc"}"#);
        assert_eq!(cookie.domain.as_deref(), Some("ws.example"));
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.secure, Some(true));

        assert!(!store.is_locked());
        let socket_url = Url::parse("wss://ws.example/wss/?EIO=3").expect("url");
        let saved = store.load(&socket_url).await.expect("load");
        assert_eq!(saved, vec![cookie]);
    }

    #[tokio::test]
    async fn test_bridge_sends_and_falls_back_to_stored_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/init"))
            .and(header("cookie", "PHPSESSID=Y"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"result": {"user": 7}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCookieStore::new());
        let api_url = Url::parse(&server.uri()).expect("url");
        store
            .save(&api_url, vec![Cookie::new(API_SESSION_COOKIE, "Y")])
            .await
            .expect("seed");

        let cookie = bridge(&server, &store).run().await.expect("bridge");
        assert_eq!(cookie.value, r#"{"user":7}"#);
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.secure, None);
    }

    #[tokio::test]
    async fn test_bridge_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/init"))
            .and(body_json(json!({"client": "rust"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Set-Cookie", "PHPSESSID=X")
                    .set_body_json(json!({"result": {}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCookieStore::new());
        let cookie = bridge(&server, &store)
            .with_body(json!({"client": "rust"}))
            .run()
            .await
            .expect("bridge");
        assert_eq!(cookie.value, "{}");
    }

    #[tokio::test]
    async fn test_bridge_releases_lock_when_result_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("Set-Cookie", "PHPSESSID=X")
                    .set_body_json(json!({"error": "denied"})),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCookieStore::new());
        let err = bridge(&server, &store).run().await.expect_err("no result");

        assert!(matches!(err, Error::SessionBridge { ref message } if message.contains("403")));
        assert!(!store.is_locked());
        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn test_bridge_requires_api_session_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"result": {"token": "abc"}})),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCookieStore::new());
        let err = bridge(&server, &store).run().await.expect_err("no cookie");

        assert!(matches!(err, Error::MissingCookie { ref name } if name == "PHPSESSID"));
        assert!(!store.is_locked());
    }

    #[tokio::test]
    async fn test_bridge_releases_lock_when_request_fails() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryCookieStore::new());
        let bridge = bridge(&server, &store);
        drop(server);

        let err = bridge.run().await.expect_err("unreachable");
        assert!(matches!(err, Error::Http(_)));
        assert!(!store.is_locked());

        // A second init can take the lock again.
        let api = Url::parse("http://127.0.0.1/").expect("url");
        let (_, lock) = store.load_and_lock(&api).await.expect("relock");
        store.save_and_unlock(&api, Vec::new(), lock).await.expect("unlock");
    }

    #[tokio::test]
    async fn test_bridge_finishes_and_unlocks_when_caller_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/init"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Set-Cookie", "PHPSESSID=X; Path=/")
                    .set_body_json(json!({"result": {"token": "late"}}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCookieStore::new());
        let abandoned = timeout(Duration::from_millis(50), bridge(&server, &store).run()).await;
        assert!(abandoned.is_err(), "caller timed out mid-exchange");

        // Waits for the init section, which the detached exchange still ends.
        let socket_url = Url::parse("wss://ws.example/wss/?EIO=3").expect("url");
        let saved = timeout(Duration::from_secs(2), store.load(&socket_url))
            .await
            .expect("init lock released")
            .expect("load");

        assert!(!store.is_locked());
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].value, r#"{"token":"late"}"#);
    }
}
