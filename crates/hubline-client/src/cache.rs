//! # Response Cache
//!
//! In-memory cache of successful read responses with a fixed freshness
//! window and lazy eviction.
//!
//! ## Key Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CacheKey                                                               │
//! │                                                                         │
//! │   GET /latest.json?page=1 #e3b0c44298fc1c14 @9f86d081884c7d65           │
//! │   ─── ─────────────────── ──────────────── ─────────────────            │
//! │    │          │                   │          └─ credential              │
//! │    │          │                   │             fingerprint or "anon"   │
//! │    │          │                   └─ sha256(body), first 16 hex chars   │
//! │    │          └─ endpoint path + query                                  │
//! │    └─ method                                                            │
//! │                                                                         │
//! │  Responses fetched with different credentials never share a key.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hubline_core::Credential;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

const DIGEST_LEN: usize = 16;

/// Truncated hex sha256.
fn short_digest(bytes: &[u8]) -> String {
    let mut digest = hex::encode(Sha256::digest(bytes));
    digest.truncate(DIGEST_LEN);
    digest
}

// =============================================================================
// Cache Key
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub method: String,
    pub endpoint: String,
    pub body_hash: String,
    /// Fingerprint of the credential the request was sent with. Never the
    /// raw secret.
    pub principal: Option<String>,
}

impl CacheKey {
    pub fn new(
        method: &str,
        endpoint: &str,
        body: Option<&Value>,
        credential: Option<&Credential>,
    ) -> Self {
        let bytes = body.map(|b| b.to_string()).unwrap_or_default();

        CacheKey {
            method: method.to_ascii_uppercase(),
            endpoint: endpoint.to_string(),
            body_hash: short_digest(bytes.as_bytes()),
            principal: credential.map(|c| short_digest(c.expose().as_bytes())),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// Endpoint without its query string.
    pub fn path(&self) -> &str {
        self.endpoint.split('?').next().unwrap_or(&self.endpoint)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} #{} ", self.method, self.endpoint, self.body_hash)?;
        match &self.principal {
            Some(principal) => write!(f, "@{}", principal),
            None => f.write_str("anon"),
        }
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// Immutable once stored; a fresh entry replaces a stale one outright.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Value,
    pub stored_at: Instant,
    pub stored_at_utc: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// Snapshot returned by [`ResponseCache::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub ttl_secs: u64,
    pub keys: Vec<String>,
}

// =============================================================================
// Response Cache
// =============================================================================

pub struct ResponseCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        ResponseCache {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh payload for `key`, if any.
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        self.get_at(key, Instant::now()).await
    }

    /// Same as [`get`](Self::get) with an explicit clock.
    ///
    /// A stale entry is evicted on the way out.
    pub async fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Value> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_fresh_at(now, self.ttl) => {
                    return Some(entry.payload.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // Re-check: another writer may have refreshed it in between.
        if let Some(entry) = entries.get(key) {
            if entry.is_fresh_at(now, self.ttl) {
                return Some(entry.payload.clone());
            }
            entries.remove(key);
            debug!(key = %key, "Evicted stale cache entry");
        }
        None
    }

    pub async fn insert(&self, key: CacheKey, payload: Value) {
        self.insert_at(key, payload, Instant::now()).await
    }

    pub async fn insert_at(&self, key: CacheKey, payload: Value, now: Instant) {
        let entry = CacheEntry {
            payload,
            stored_at: now,
            stored_at_utc: Utc::now(),
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Removes one exact entry. Returns whether it existed.
    pub async fn invalidate_key(&self, key: &CacheKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Removes every entry whose path (query ignored) equals `endpoint`'s path.
    ///
    /// Covers all methods, bodies and both authenticated and anonymous
    /// variants. Returns the number removed.
    pub async fn invalidate_endpoint(&self, endpoint: &str) -> usize {
        let path = endpoint.split('?').next().unwrap_or(endpoint);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.path() != path);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(endpoint = %path, removed, "Invalidated cache entries");
        }
        removed
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        debug!(count, "Cache cleared");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries.keys().map(ToString::to_string).collect();
        keys.sort();
        CacheStats {
            entries: entries.len(),
            ttl_secs: self.ttl.as_secs(),
            keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef";

    fn key(endpoint: &str, authenticated: bool) -> CacheKey {
        let credential = Credential::new(TOKEN);
        CacheKey::new("GET", endpoint, None, authenticated.then_some(&credential))
    }

    #[tokio::test]
    async fn test_fresh_within_window() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        let t0 = Instant::now();
        cache
            .insert_at(key("/latest.json", false), json!({"n": 1}), t0)
            .await;

        let hit = cache
            .get_at(&key("/latest.json", false), t0 + Duration::from_secs(299))
            .await;
        assert_eq!(hit, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_stale_after_window_is_evicted() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        let t0 = Instant::now();
        cache
            .insert_at(key("/latest.json", false), json!({"n": 1}), t0)
            .await;

        let miss = cache
            .get_at(&key("/latest.json", false), t0 + Duration::from_secs(301))
            .await;
        assert!(miss.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_auth_and_anon_keys_do_not_collide() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        cache.insert(key("/t/1.json", false), json!("public")).await;
        cache.insert(key("/t/1.json", true), json!("private")).await;

        assert_eq!(cache.get(&key("/t/1.json", false)).await, Some(json!("public")));
        assert_eq!(cache.get(&key("/t/1.json", true)).await, Some(json!("private")));
        assert_eq!(cache.len().await, 2);
    }

    #[test]
    fn test_body_hash_distinguishes_bodies() {
        let a = CacheKey::new("POST", "/x", Some(&json!({"a": 1})), None);
        let b = CacheKey::new("POST", "/x", Some(&json!({"a": 2})), None);
        assert_ne!(a, b);
        assert_eq!(a.body_hash.len(), DIGEST_LEN);
        assert_eq!(CacheKey::new("get", "/x", None, None).method, "GET");
    }

    #[test]
    fn test_principal_distinguishes_credentials() {
        let first = Credential::new(TOKEN);
        let second = Credential::new("fedcba9876543210fedcba9876543210");

        let a = CacheKey::new("GET", "/session/current.json", None, Some(&first));
        let b = CacheKey::new("GET", "/session/current.json", None, Some(&second));
        let anon = CacheKey::new("GET", "/session/current.json", None, None);

        assert_ne!(a, b);
        assert!(a.is_authenticated());
        assert!(!anon.is_authenticated());
        assert_eq!(a, CacheKey::new("GET", "/session/current.json", None, Some(&first)));

        let shown = a.to_string();
        assert!(!shown.contains(TOKEN));
        assert!(shown.ends_with(a.principal.as_deref().unwrap()));
        assert!(anon.to_string().ends_with("anon"));
    }

    #[tokio::test]
    async fn test_invalidate_endpoint_ignores_query() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        cache.insert(key("/latest.json?page=0", false), json!(0)).await;
        cache.insert(key("/latest.json?page=1", true), json!(1)).await;
        cache.insert(key("/categories.json", false), json!(2)).await;

        let removed = cache.invalidate_endpoint("/latest.json").await;
        assert_eq!(removed, 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        cache.insert(key("/a", false), json!(1)).await;
        cache.insert(key("/b", true), json!(2)).await;

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.ttl_secs, 300);
        assert!(stats.keys.iter().any(|k| k.starts_with("GET /a ")));

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
