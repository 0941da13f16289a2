//! JSON calls against the API host, sharing the session cookies.
//!
//! | Method | Request |
//! |--------|---------|
//! | [`ApiClient::call`] | `GET` without a body, `POST` with one |
//! | [`ApiClient::delete`] | `DELETE`, body optional |
//! | [`ApiClient::put`] | `PUT`, body required |
//!
//! Every request carries the stored cookies for its URL and every response
//! writes its `Set-Cookie` cookies back to the store. Loading goes through
//! [`CookieStore::load`], so a call issued while the session bridge runs
//! waits for it and sees the fresh session.
//!
//! Dropping a call's future aborts the request.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::COOKIE;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::endpoints::Endpoints;
use crate::error::{Error, Result};

use super::cookie::{Cookie, cookie_header};
use super::store::CookieStore;

// ============================================================================
// ApiClient
// ============================================================================

/// HTTP client for the API host.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    store: Arc<dyn CookieStore>,
}

impl ApiClient {
    /// Creates a client rooted at the origin of the init URL.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoints: &Endpoints, store: Arc<dyn CookieStore>) -> Self {
        let mut base = endpoints.init_url().clone();
        base.set_path("/");
        base.set_query(None);
        base.set_fragment(None);

        Self { http, base, store }
    }

    /// Root URL that request paths are resolved against.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `GET` when `body` is `None`, otherwise `POST` with the JSON body.
    ///
    /// `path` may carry a query string. Returns the response body as text.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `path` does not resolve against the base URL
    /// - [`Error::Config`] if `path` resolves to another origin
    /// - [`Error::Http`] if the request fails or the status is not a success
    pub async fn call(&self, path: &str, body: Option<&Value>) -> Result<String> {
        let method = if body.is_some() { Method::POST } else { Method::GET };
        self.send(method, path, body).await
    }

    /// `DELETE`, with an optional JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call`].
    pub async fn delete(&self, path: &str, body: Option<&Value>) -> Result<String> {
        self.send(Method::DELETE, path, body).await
    }

    /// `PUT` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call`].
    pub async fn put(&self, path: &str, body: &Value) -> Result<String> {
        self.send(Method::PUT, path, Some(body)).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String> {
        let url = self.resolve(path)?;
        let cookies = self.store.load(&url).await?;

        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(header) = cookie_header(&cookies) {
            request = request.header(COOKIE, header);
        }

        debug!(%method, %url, "API request");
        let response = request.send().await?;
        let status = response.status();

        let host = url.host_str().unwrap_or_default();
        let received: Vec<Cookie> = response
            .cookies()
            .map(|cookie| Cookie::from_response(&cookie, host))
            .collect();

        if !received.is_empty() {
            trace!(count = received.len(), "Storing response cookies");
            self.store.save(&url, received).await?;
        }

        let text = response.error_for_status()?.text().await?;
        debug!(%method, %url, %status, bytes = text.len(), "API response");
        Ok(text)
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        let url = self.base.join(path)?;
        if url.origin() != self.base.origin() {
            return Err(Error::config(format!("API path leaves the API host: {path}")));
        }
        Ok(url)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
