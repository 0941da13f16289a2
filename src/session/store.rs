//! Cookie persistence with an exclusive session-init section.
//!
//! [`CookieStore::load_and_lock`] enters a critical section that lasts until
//! the matching [`CookieStore::save_and_unlock`]. While it is held, every
//! other load or save waits. The [`InitLock`] returned by the first call is
//! the only way to end the section.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

use super::cookie::Cookie;

// ============================================================================
// InitLock
// ============================================================================

/// Proof that the session-init lock is held.
///
/// Returned by [`CookieStore::load_and_lock`] and consumed by
/// [`CookieStore::save_and_unlock`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "the init lock stays held until passed to save_and_unlock"]
pub struct InitLock {
    token: u64,
}

impl InitLock {
    /// Creates a lock proof. Stores hand these out from `load_and_lock`.
    #[inline]
    pub const fn new(token: u64) -> Self {
        Self { token }
    }

    /// Store-specific token identifying this acquisition.
    #[inline]
    #[must_use]
    pub const fn token(&self) -> u64 {
        self.token
    }
}

// ============================================================================
// CookieStore
// ============================================================================

/// Persistent cookie storage.
///
/// Every `load_and_lock` must be followed by exactly one `save_and_unlock`
/// with the returned [`InitLock`], including when the work in between fails.
#[async_trait]
pub trait CookieStore: Send + Sync {
    /// Returns the cookies that apply to `url`.
    async fn load(&self, url: &Url) -> Result<Vec<Cookie>>;

    /// Stores cookies received for `url`.
    async fn save(&self, url: &Url, cookies: Vec<Cookie>) -> Result<()>;

    /// Like [`load`](Self::load), then holds the init lock.
    ///
    /// On error the lock is not held.
    async fn load_and_lock(&self, url: &Url) -> Result<(Vec<Cookie>, InitLock)>;

    /// Like [`save`](Self::save), then releases the init lock held by `lock`.
    ///
    /// The lock is released even if saving fails. A `lock` that does not
    /// match the held lock is refused and nothing is saved.
    async fn save_and_unlock(&self, url: &Url, cookies: Vec<Cookie>, lock: InitLock) -> Result<()>;
}

// ============================================================================
// MemoryCookieStore
// ============================================================================

/// In-process cookie jar.
#[derive(Default)]
pub struct MemoryCookieStore {
    /// All stored cookies.
    jar: RwLock<Vec<Cookie>>,
    /// Exclusive section for session init.
    init_lock: Arc<AsyncMutex<()>>,
    /// Token and guard parked between `load_and_lock` and `save_and_unlock`.
    held: Mutex<Option<(u64, OwnedMutexGuard<()>)>>,
    /// Last handed-out lock token.
    tokens: AtomicU64,
}

impl MemoryCookieStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every stored cookie.
    #[must_use]
    pub fn all(&self) -> Vec<Cookie> {
        self.jar.read().clone()
    }

    /// Returns `true` while the init lock is held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.held.lock().is_some()
    }

    fn matching(&self, url: &Url) -> Vec<Cookie> {
        self.jar
            .read()
            .iter()
            .filter(|cookie| cookie.matches(url))
            .cloned()
            .collect()
    }

    fn store(&self, url: &Url, cookies: Vec<Cookie>) {
        let now = SystemTime::now();
        let host = url.host_str().unwrap_or_default();
        let mut jar = self.jar.write();

        for mut cookie in cookies {
            if cookie.domain.is_none() {
                cookie.domain = Some(host.to_string());
            }
            if cookie.path.is_none() {
                cookie.path = Some("/".to_string());
            }

            jar.retain(|existing| !existing.same_identity(&cookie));

            if cookie.is_expired_at(now) {
                debug!(name = %cookie.name, "Expired cookie removed");
                continue;
            }
            jar.push(cookie);
        }
    }
}

#[async_trait]
impl CookieStore for MemoryCookieStore {
    async fn load(&self, url: &Url) -> Result<Vec<Cookie>> {
        let _gate = self.init_lock.lock().await;
        Ok(self.matching(url))
    }

    async fn save(&self, url: &Url, cookies: Vec<Cookie>) -> Result<()> {
        let _gate = self.init_lock.lock().await;
        self.store(url, cookies);
        Ok(())
    }

    async fn load_and_lock(&self, url: &Url) -> Result<(Vec<Cookie>, InitLock)> {
        let guard = Arc::clone(&self.init_lock).lock_owned().await;
        let token = self.tokens.fetch_add(1, Ordering::Relaxed) + 1;
        let cookies = self.matching(url);
        *self.held.lock() = Some((token, guard));
        Ok((cookies, InitLock::new(token)))
    }

    async fn save_and_unlock(&self, url: &Url, cookies: Vec<Cookie>, lock: InitLock) -> Result<()> {
        let held = {
            let mut held = self.held.lock();
            match held.as_ref() {
                Some((token, _)) if *token == lock.token() => held.take(),
                _ => None,
            }
        };

        let Some((_, guard)) = held else {
            warn!(token = lock.token(), "save_and_unlock with a lock that is not held");
            return Err(Error::config("Init lock is not held by this caller"));
        };

        // Still inside the section while writing.
        self.store(url, cookies);
        drop(guard);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryCookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCookieStore")
            .field("cookies", &self.jar.read().len())
            .field("locked", &self.is_locked())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("url")
    }

    #[tokio::test]
    async fn test_save_defaults_domain_and_path() {
        let store = MemoryCookieStore::new();
        store
            .save(&url("https://api.example/api/v1/init"), vec![Cookie::new("PHPSESSID", "X")])
            .await
            .expect("save");

        let all = store.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].domain.as_deref(), Some("api.example"));
        assert_eq!(all[0].path.as_deref(), Some("/"));
    }

    #[tokio::test]
    async fn test_load_filters_by_url() {
        let store = MemoryCookieStore::new();
        store
            .save(&url("https://api.example/"), vec![Cookie::new("a", "1")])
            .await
            .expect("save");
        store
            .save(&url("wss://ws.example/wss/"), vec![Cookie::new("b", "2")])
            .await
            .expect("save");

        let api = store.load(&url("https://api.example/api/v1/init")).await.expect("load");
        assert_eq!(api, vec![Cookie::new("a", "1").with_domain("api.example").with_path("/")]);

        let ws = store.load(&url("wss://ws.example/wss/?EIO=3")).await.expect("load");
        assert_eq!(ws.len(), 1);
        assert_eq!(ws[0].name, "b");
    }

    #[tokio::test]
    async fn test_save_replaces_same_cookie() {
        let store = MemoryCookieStore::new();
        let target = url("https://h/");
        store.save(&target, vec![Cookie::new("s", "1")]).await.expect("save");
        store.save(&target, vec![Cookie::new("s", "2")]).await.expect("save");

        let cookies = store.load(&target).await.expect("load");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "2");
    }

    #[tokio::test]
    async fn test_expired_cookie_deletes() {
        let store = MemoryCookieStore::new();
        let target = url("https://h/");
        store.save(&target, vec![Cookie::new("s", "1")]).await.expect("save");
        store
            .save(&target, vec![Cookie::new("s", "").with_expiration_date(1.0)])
            .await
            .expect("save");

        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn test_lock_blocks_other_access_until_unlock() {
        let store = Arc::new(MemoryCookieStore::new());
        let api = url("https://api.example/");

        let (_, lock) = store.load_and_lock(&api).await.expect("lock");
        assert!(store.is_locked());

        let blocked = timeout(Duration::from_millis(50), store.load(&api)).await;
        assert!(blocked.is_err(), "load must wait for the init lock");

        let waiter = {
            let store = Arc::clone(&store);
            let api = api.clone();
            tokio::spawn(async move { store.load(&api).await })
        };

        store
            .save_and_unlock(&api, vec![Cookie::new("s", "v")], lock)
            .await
            .expect("unlock");
        assert!(!store.is_locked());

        let loaded = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("unblocked")
            .expect("join")
            .expect("load");
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_serializes_initializers() {
        let store = Arc::new(MemoryCookieStore::new());
        let api = url("https://api.example/");

        let (_, first) = store.load_and_lock(&api).await.expect("lock");

        let second = {
            let store = Arc::clone(&store);
            let api = api.clone();
            tokio::spawn(async move { store.load_and_lock(&api).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());

        store.save_and_unlock(&api, Vec::new(), first).await.expect("unlock");
        let (_, second) = timeout(Duration::from_secs(1), second)
            .await
            .expect("second lock acquired")
            .expect("join")
            .expect("lock");

        store.save_and_unlock(&api, Vec::new(), second).await.expect("unlock");
        assert!(!store.is_locked());
    }

    #[tokio::test]
    async fn test_unlock_with_foreign_lock_is_refused() {
        let store = MemoryCookieStore::new();
        let api = url("https://h/");

        // Never locked.
        let err = store
            .save_and_unlock(&api, vec![Cookie::new("s", "1")], InitLock::new(7))
            .await
            .expect_err("not held");
        assert!(matches!(err, Error::Config { .. }));
        assert!(store.all().is_empty());

        let (_, lock) = store.load_and_lock(&api).await.expect("lock");
        let forged = InitLock::new(lock.token() + 1);
        assert!(store.save_and_unlock(&api, vec![Cookie::new("s", "2")], forged).await.is_err());
        assert!(store.is_locked(), "someone else's section stays held");
        assert!(store.all().is_empty());

        let token = lock.token();
        store.save_and_unlock(&api, Vec::new(), lock).await.expect("unlock");
        assert!(!store.is_locked());

        // A spent lock cannot release a later section.
        let (_, next) = store.load_and_lock(&api).await.expect("relock");
        assert!(store.save_and_unlock(&api, Vec::new(), InitLock::new(token)).await.is_err());
        store.save_and_unlock(&api, Vec::new(), next).await.expect("unlock");
    }
}
