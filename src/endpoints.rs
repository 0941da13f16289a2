//! HTTP and socket endpoint URLs.
//!
//! | Endpoint | URL |
//! |----------|-----|
//! | Session init | `{http,https}://<api host>/api/v1/init` |
//! | Socket | `{ws,wss}://<socket host>/wss/?EIO=3&transport=websocket` |

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Path of the session-init endpoint.
pub const INIT_PATH: &str = "/api/v1/init";

/// Path of the socket endpoint.
pub const SOCKET_PATH: &str = "/wss/";

/// Engine.IO protocol revision sent in the socket query.
pub const ENGINE_IO_VERSION: &str = "3";

// ============================================================================
// Endpoints
// ============================================================================

/// Resolved endpoint pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    init: Url,
    socket: Url,
}

impl Endpoints {
    /// Builds both URLs from host names (optionally with a port).
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if a host does not form a valid URL
    /// - [`Error::Config`] if a host is empty
    pub fn new(api_host: &str, socket_host: &str, secure: bool) -> Result<Self> {
        if api_host.is_empty() || socket_host.is_empty() {
            return Err(Error::config("API and socket hosts must not be empty"));
        }

        let (http, ws) = if secure { ("https", "wss") } else { ("http", "ws") };

        let init = Url::parse(&format!("{http}://{api_host}{INIT_PATH}"))?;

        let mut socket = Url::parse(&format!("{ws}://{socket_host}{SOCKET_PATH}"))?;
        socket
            .query_pairs_mut()
            .append_pair("EIO", ENGINE_IO_VERSION)
            .append_pair("transport", "websocket");

        Self::from_urls(init, socket)
    }

    /// Uses explicit URLs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either URL has no host or the socket URL
    /// is not a WebSocket URL.
    pub fn from_urls(init: Url, socket: Url) -> Result<Self> {
        if init.host_str().is_none() || socket.host_str().is_none() {
            return Err(Error::config("Endpoint URLs must have a host"));
        }
        if !matches!(socket.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Socket URL must use ws or wss, got {}",
                socket.scheme()
            )));
        }

        Ok(Self { init, socket })
    }

    /// Session-init URL.
    #[inline]
    #[must_use]
    pub fn init_url(&self) -> &Url {
        &self.init
    }

    /// Socket URL.
    #[inline]
    #[must_use]
    pub fn socket_url(&self) -> &Url {
        &self.socket
    }

    /// Host of the session-init URL.
    #[must_use]
    pub fn api_host(&self) -> &str {
        self.init.host_str().unwrap_or_default()
    }

    /// Host of the socket URL.
    #[must_use]
    pub fn socket_host(&self) -> &str {
        self.socket.host_str().unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_endpoints() {
        let endpoints = Endpoints::new("api.example", "ws.example", true).expect("endpoints");
        assert_eq!(endpoints.init_url().as_str(), "https://api.example/api/v1/init");
        assert_eq!(
            endpoints.socket_url().as_str(),
            "wss://ws.example/wss/?EIO=3&transport=websocket"
        );
        assert_eq!(endpoints.api_host(), "api.example");
        assert_eq!(endpoints.socket_host(), "ws.example");
    }

    #[test]
    fn test_plain_endpoints_with_port() {
        let endpoints = Endpoints::new("127.0.0.1:8080", "127.0.0.1:9090", false).expect("endpoints");
        assert_eq!(endpoints.init_url().as_str(), "http://127.0.0.1:8080/api/v1/init");
        assert_eq!(
            endpoints.socket_url().as_str(),
            "ws://127.0.0.1:9090/wss/?EIO=3&transport=websocket"
        );
    }

    #[test]
    fn test_rejects_empty_host() {
        assert!(matches!(
            Endpoints::new("", "ws.example", true),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_rejects_http_socket_url() {
        let init = Url::parse("https://a/api/v1/init").expect("url");
        let socket = Url::parse("https://b/wss/").expect("url");
        assert!(Endpoints::from_urls(init, socket).is_err());
    }
}
