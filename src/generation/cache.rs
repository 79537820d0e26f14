//! Response cache for generated content.
//!
//! Identical requests within the TTL window are served from memory
//! instead of hitting the upstream provider again. Backed by moka for
//! concurrent access with TinyLFU eviction and per-entry TTL.

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::Expiry;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

use crate::config::GenerationConfig;

use super::service::{GeneratedArtifact, GenerationError, GenerationRequest, GenerationService};

/// Default TTL for cached responses (1 hour).
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct CacheEntry {
    artifact: GeneratedArtifact,
    /// Custom TTL for this entry, None means use default
    custom_ttl: Option<Duration>,
}

/// Expiry implementation that supports per-entry TTL
struct CacheExpiry {
    default_ttl: Duration,
}

impl Expiry<String, CacheEntry> for CacheExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.custom_ttl.unwrap_or(self.default_ttl))
    }

    fn expire_after_read(
        &self,
        _key: &String,
        _value: &CacheEntry,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        // Don't change expiry on read (TTL behavior, not TTI)
        duration_until_expiry
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Reset TTL on update
        Some(value.custom_ttl.unwrap_or(self.default_ttl))
    }
}

/// Cache of generation responses keyed by request content.
///
/// Keys are the SHA-256 of the serialized request, so equal requests hit
/// the same entry regardless of who issued them.
#[derive(Clone)]
pub struct GenerationCache {
    inner: MokaCache<String, CacheEntry>,
}

impl GenerationCache {
    /// Create a new cache with the given capacity and default TTL.
    #[must_use]
    pub fn new(max_entries: u64, default_ttl: Duration) -> Self {
        let expiry = CacheExpiry { default_ttl };
        let cache = MokaCache::builder()
            .max_capacity(max_entries)
            .expire_after(expiry)
            .build();

        Self { inner: cache }
    }

    /// Create a cache from generation configuration.
    #[must_use]
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(
            config.cache_max_entries,
            Duration::from_secs(config.cache_ttl_seconds),
        )
    }

    /// Look up a cached response for a request.
    pub async fn get(&self, request: &GenerationRequest) -> Option<GeneratedArtifact> {
        let key = Self::cache_key(request)?;
        self.inner.get(&key).await.map(|entry| entry.artifact)
    }

    /// Store a response, optionally with a custom TTL.
    pub async fn put(
        &self,
        request: &GenerationRequest,
        artifact: GeneratedArtifact,
        ttl: Option<Duration>,
    ) {
        if let Some(key) = Self::cache_key(request) {
            self.inner
                .insert(
                    key,
                    CacheEntry {
                        artifact,
                        custom_ttl: ttl,
                    },
                )
                .await;
        }
    }

    /// Drop all cached responses.
    pub async fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
    }

    /// Run pending maintenance tasks (eviction, expiration).
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Current number of cached entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    fn cache_key(request: &GenerationRequest) -> Option<String> {
        // Serialization of a plain data enum cannot fail in practice;
        // skip caching rather than propagate if it somehow does.
        let bytes = serde_json::to_vec(request).ok()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Some(hex::encode(hasher.finalize()))
    }
}

impl Default for GenerationCache {
    fn default() -> Self {
        Self::new(10_000, DEFAULT_TTL)
    }
}

/// A generation service wrapper that caches successful responses.
///
/// Failures are never cached; the next identical request retries the
/// upstream provider.
#[derive(Clone)]
pub struct CachedGenerationService<G> {
    service: G,
    cache: GenerationCache,
}

impl<G: GenerationService> CachedGenerationService<G> {
    /// Wrap a generation service with a response cache.
    #[must_use]
    pub fn new(service: G, cache: GenerationCache) -> Self {
        Self { service, cache }
    }

    /// Access the underlying cache.
    #[must_use]
    pub fn cache(&self) -> &GenerationCache {
        &self.cache
    }
}

#[async_trait]
impl<G: GenerationService> GenerationService for CachedGenerationService<G> {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<GeneratedArtifact, GenerationError> {
        if let Some(artifact) = self.cache.get(request).await {
            tracing::debug!(
                target: "lernwerk::generation",
                kind = request.kind(),
                "Generation cache hit"
            );
            return Ok(artifact);
        }

        let artifact = self.service.generate(request).await?;
        self.cache.put(request, artifact.clone(), None).await;
        Ok(artifact)
    }
}
