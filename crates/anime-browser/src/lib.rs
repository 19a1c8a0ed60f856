//! Anime discovery client core.
//!
//! Sits between a UI and the rate-limited Jikan catalog API, providing
//! TTL-based response caching shared across browser contexts, stale
//! search cancellation, cross-context cache change notification and
//! input debouncing. Presentation (layout, theming, routing) is the
//! caller's business; everything here is reachable through the
//! [`AnimeBrowser`] facade and the flow orchestrators.

pub mod api;
pub mod cache;
pub mod debounce;
pub mod error;
pub mod flows;
pub mod service;
pub mod watch;

pub use api::{Anime, JikanClient, SearchResponse};
pub use cache::{CacheStats, CacheStore};
pub use error::FetchError;
pub use flows::{DetailFlow, SearchFlow, SuggestionSection};
pub use service::{CatalogService, Fetched, Origin, TtlPolicy};
pub use watch::{CacheWatcher, Subscription};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// UI-facing assembly of the core: coordinator, cache and watcher built
/// from one configuration.
pub struct AnimeBrowser {
    service: Arc<CatalogService>,
    watcher: CacheWatcher,
    debounce_delay: Duration,
    suggestion_gap: Duration,
}

impl AnimeBrowser {
    /// Build the full client stack from configuration
    pub fn from_config(config: &shared::Config) -> Result<Self> {
        let client = JikanClient::new(
            config.api.base_url.clone(),
            config.api.page_size,
            Duration::from_secs(config.api.timeout_seconds),
        )?;

        let cache = CacheStore::new(
            config.cache_dir(),
            config.cache.prefix.clone(),
            config.cache.enabled,
        )?;

        let watcher = CacheWatcher::new(
            config.cache_dir(),
            config.cache.prefix.clone(),
            Duration::from_millis(config.cache.watch_interval_ms),
            cache.journal(),
        );

        let ttl = TtlPolicy {
            search_minutes: config.cache.search_ttl_minutes,
            list_minutes: config.cache.list_ttl_minutes,
            detail_minutes: config.cache.detail_ttl_minutes,
        };

        Ok(Self {
            service: Arc::new(CatalogService::new(client, cache, ttl)),
            watcher,
            debounce_delay: Duration::from_millis(config.search.debounce_ms),
            suggestion_gap: Duration::from_millis(config.api.suggestion_gap_ms),
        })
    }

    /// The request coordinator, for flows built by hand
    pub fn service(&self) -> Arc<CatalogService> {
        Arc::clone(&self.service)
    }

    /// One-shot catalog search
    pub async fn search(
        &self,
        query: &str,
        page: u32,
        genre: Option<u32>,
    ) -> std::result::Result<Fetched<SearchResponse>, FetchError> {
        self.service.search(query, page, genre).await
    }

    /// One-shot detail fetch
    pub async fn detail(&self, id: u32) -> std::result::Result<Fetched<Anime>, FetchError> {
        self.service.anime_by_id(id).await
    }

    /// Curated home sections (two rate-paced catalog calls)
    pub async fn suggestions(
        &self,
    ) -> std::result::Result<Vec<SuggestionSection>, FetchError> {
        flows::load_suggestions(&self.service, self.suggestion_gap).await
    }

    /// Approximate cache footprint in bytes
    pub fn cache_size(&self) -> u64 {
        self.service.cache().size_bytes()
    }

    /// Cache statistics (entry count and footprint)
    pub fn cache_stats(&self) -> CacheStats {
        self.service.cache().stats()
    }

    /// Remove every cached response under this client's namespace
    pub fn clear_cache(&self) {
        self.service.cache().clear();
    }

    /// Subscribe to cache writes made by other contexts
    pub fn on_cache_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(String, serde_json::Value) + Send + 'static,
    {
        self.watcher.subscribe(callback)
    }

    /// A search flow wired to this client's debounce delay and watcher
    pub fn search_flow(&self) -> SearchFlow {
        let mut flow = SearchFlow::new(self.service(), self.debounce_delay);
        flow.attach_watcher(&self.watcher);
        flow
    }

    /// A detail flow over this client's coordinator
    pub fn detail_flow(&self) -> DetailFlow {
        DetailFlow::new(self.service())
    }
}
