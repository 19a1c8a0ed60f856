//! Request coordination: cache-first access to the catalog API.
//!
//! Every operation derives a deterministic cache key, answers from the
//! persistent store when the entry is fresh, and writes through on network
//! success with the TTL configured for its data class. The search class is
//! additionally single-flight: issuing a new search invalidates the
//! previous one, and a superseded call reports `Cancelled` instead of data.

use crate::api::{Anime, JikanClient, SearchResponse};
use crate::cache::CacheStore;
use crate::error::FetchError;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Where a coordinated response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Network,
}

/// A coordinated response together with its origin
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub data: T,
    pub origin: Origin,
}

/// Per-data-class TTLs in minutes.
///
/// Policy lives here, not in the cache: list endpoints mutate more slowly
/// than search is invoked, so they keep entries longer.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    pub search_minutes: u64,
    pub list_minutes: u64,
    pub detail_minutes: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            search_minutes: 30,
            list_minutes: 60,
            detail_minutes: 60,
        }
    }
}

/// Coordinates catalog requests through the cache
pub struct CatalogService {
    client: JikanClient,
    cache: CacheStore,
    ttl: TtlPolicy,
    /// Sequence counter for the search request class. Owned here rather
    /// than living in module-global state; each issued search captures the
    /// counter and a mismatch on completion means it was superseded.
    search_seq: AtomicU64,
}

impl CatalogService {
    /// Create a new catalog service
    pub fn new(client: JikanClient, cache: CacheStore, ttl: TtlPolicy) -> Self {
        Self {
            client,
            cache,
            ttl,
            search_seq: AtomicU64::new(0),
        }
    }

    /// The underlying cache store (size, clear, journal)
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Search anime by query, page and optional genre filter.
    ///
    /// Cache-first; on a miss the network call is issued and any still
    /// pending earlier search is invalidated. A superseded call returns
    /// `FetchError::Cancelled` and its result is discarded, never cached.
    pub async fn search(
        &self,
        query: &str,
        page: u32,
        genre: Option<u32>,
    ) -> Result<Fetched<SearchResponse>, FetchError> {
        let key = search_key(query, page, genre);

        // Issuing a new search supersedes the previous one of this class,
        // whether or not this call ends up hitting the network
        let seq = self.search_seq.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(cached) = self.cache.get::<SearchResponse>(&key) {
            return Ok(Fetched {
                data: cached,
                origin: Origin::Cache,
            });
        }

        let result = self.client.search_anime(query.trim(), page, genre).await;

        // A newer search was issued while this one was in flight; its
        // outcome, success or failure, must not be applied
        if self.search_seq.load(Ordering::SeqCst) != seq {
            debug!(key = %key, "Search superseded, discarding result");
            return Err(FetchError::Cancelled);
        }

        let response = result?;
        self.cache.set(&key, &response, self.ttl.search_minutes);

        Ok(Fetched {
            data: response,
            origin: Origin::Network,
        })
    }

    /// Fetch full anime details by MAL ID
    pub async fn anime_by_id(&self, id: u32) -> Result<Fetched<Anime>, FetchError> {
        let key = format!("anime_{}", id);

        if let Some(cached) = self.cache.get::<Anime>(&key) {
            return Ok(Fetched {
                data: cached,
                origin: Origin::Cache,
            });
        }

        let response = self.client.anime_by_id(id).await?;
        self.cache.set(&key, &response.data, self.ttl.detail_minutes);

        Ok(Fetched {
            data: response.data,
            origin: Origin::Network,
        })
    }

    /// Fetch a page of the all-time top anime list
    pub async fn top_anime(&self, page: u32) -> Result<Fetched<SearchResponse>, FetchError> {
        let key = format!("top_{}", page);

        if let Some(cached) = self.cache.get::<SearchResponse>(&key) {
            return Ok(Fetched {
                data: cached,
                origin: Origin::Cache,
            });
        }

        let response = self.client.top_anime(page).await?;
        self.cache.set(&key, &response, self.ttl.list_minutes);

        Ok(Fetched {
            data: response,
            origin: Origin::Network,
        })
    }

    /// Fetch a page of the currently airing season
    pub async fn season_now(&self, page: u32) -> Result<Fetched<SearchResponse>, FetchError> {
        let key = format!("seasonal_{}", page);

        if let Some(cached) = self.cache.get::<SearchResponse>(&key) {
            return Ok(Fetched {
                data: cached,
                origin: Origin::Cache,
            });
        }

        let response = self.client.season_now(page).await?;
        self.cache.set(&key, &response, self.ttl.list_minutes);

        Ok(Fetched {
            data: response,
            origin: Origin::Network,
        })
    }
}

/// Deterministic cache key for a search request.
///
/// The query is trimmed and lowercased. An absent genre filter and an
/// explicit genre id produce different keys, including id 0: "no filter
/// chosen" never collapses into a zero-valued filter.
pub fn search_key(query: &str, page: u32, genre: Option<u32>) -> String {
    let normalized = query.trim().to_lowercase();
    match genre {
        Some(genre_id) => format!("search_{}_{}_g{}", normalized, page, genre_id),
        None => format!("search_{}_{}", normalized, page),
    }
}
