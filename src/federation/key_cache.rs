//! Remote actor key caching
//!
//! Caches fetched actor documents and their public keys to avoid a
//! network round trip per inbound message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::signature::FetchedActor;
use crate::error::AppError;
use crate::metrics::KEY_CACHE_HITS_TOTAL;

/// Cached actor entry
#[derive(Debug, Clone)]
struct CachedActor {
    actor: FetchedActor,
    /// When this entry was cached
    cached_at: Instant,
    /// TTL for this entry
    ttl: Duration,
}

impl CachedActor {
    /// Check if this cache entry is still valid
    fn is_valid(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

/// Public key cache
///
/// Thread-safe cache for remote actor documents, keyed by keyId URL.
pub struct PublicKeyCache {
    /// Cache storage: key_id -> cached actor
    cache: Arc<RwLock<HashMap<String, CachedActor>>>,
    /// HTTP client for fetching keys
    http_client: Arc<reqwest::Client>,
    /// Default TTL for cached entries
    default_ttl: Duration,
    /// Allow fetches to loopback/private destinations (dev/test only)
    allow_private_destinations: bool,
}

impl PublicKeyCache {
    /// Create a new public key cache
    ///
    /// # Arguments
    /// * `http_client` - HTTP client for fetching keys
    /// * `default_ttl` - TTL for cached entries (default: 1 hour)
    pub fn new(http_client: Arc<reqwest::Client>, default_ttl: Option<Duration>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            http_client,
            default_ttl: default_ttl.unwrap_or(Duration::from_secs(3600)),
            allow_private_destinations: false,
        }
    }

    /// Permit fetches to loopback/private destinations.
    /// Only for local development and tests.
    pub fn with_allow_private_destinations(mut self, allow: bool) -> Self {
        self.allow_private_destinations = allow;
        self
    }

    /// Get the actor document and public key for a keyId.
    ///
    /// Checks the cache first, fetches from remote if not cached or expired.
    pub async fn get(&self, key_id: &str) -> Result<FetchedActor, AppError> {
        // 1. Check cache (read lock)
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(key_id) {
                if cached.is_valid() {
                    tracing::debug!("Public key cache hit for {}", key_id);
                    KEY_CACHE_HITS_TOTAL.with_label_values(&["hit"]).inc();
                    return Ok(cached.actor.clone());
                }
                tracing::debug!("Public key cache expired for {}", key_id);
            }
        }

        // 2. Cache miss or expired - fetch from remote
        tracing::debug!("Public key cache miss for {}, fetching...", key_id);
        KEY_CACHE_HITS_TOTAL.with_label_values(&["miss"]).inc();
        let actor = super::signature::fetch_actor(
            key_id,
            &self.http_client,
            self.allow_private_destinations,
        )
        .await?;

        // 3. Update cache (write lock)
        {
            let mut cache = self.cache.write().await;
            cache.insert(
                key_id.to_string(),
                CachedActor {
                    actor: actor.clone(),
                    cached_at: Instant::now(),
                    ttl: self.default_ttl,
                },
            );
        }

        Ok(actor)
    }

    /// Invalidate a cached entry
    ///
    /// Useful when a key is known to be invalid or changed.
    pub async fn invalidate(&self, key_id: &str) {
        let mut cache = self.cache.write().await;
        cache.remove(key_id);
        tracing::debug!("Invalidated public key cache for {}", key_id);
    }

    /// Prune expired entries
    ///
    /// Should be called periodically to clean up expired entries.
    pub async fn prune_expired(&self) {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, v| v.is_valid());
        let removed = before - cache.len();

        if removed > 0 {
            tracing::info!("Pruned {} expired public key cache entries", removed);
        }
    }

    /// Number of live (non-expired) entries
    pub async fn live_entries(&self) -> usize {
        let cache = self.cache.read().await;
        cache.values().filter(|v| v.is_valid()).count()
    }
}
