//! Jikan API client with typed failure classification.

use super::types::*;
use crate::error::{FetchError, FALLBACK_MESSAGE};
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Jikan API v4 client
pub struct JikanClient {
    /// HTTP client
    client: Client,
    /// Base URL for Jikan API
    base_url: String,
    /// Items requested per page
    page_size: u32,
}

impl JikanClient {
    /// Create a new Jikan client
    pub fn new(base_url: String, page_size: u32, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .user_agent("anime-browser/0.1.0")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            page_size,
        })
    }

    /// Make a GET request and classify the outcome
    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Issuing API request");

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| FetchError::transport(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(url = %url, "Rate limited by the catalog API");
            return Err(FetchError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = %status, "Request failed");
            return Err(classify_http_failure(status, &body));
        }

        response.json::<T>().await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to parse response");
            FetchError::transport(format!("Failed to parse response: {}", e))
        })
    }

    /// Search anime by free-text query, optionally restricted to a genre.
    /// The genre filter is omitted from the request iff `genre` is `None`;
    /// an explicit `Some(0)` is sent as-is.
    pub async fn search_anime(
        &self,
        query: &str,
        page: u32,
        genre: Option<u32>,
    ) -> Result<SearchResponse, FetchError> {
        let mut params = vec![
            ("q", query.to_string()),
            ("page", page.to_string()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(genre_id) = genre {
            params.push(("genres", genre_id.to_string()));
        }
        self.get("/anime", &params).await
    }

    /// Fetch full anime details by MAL ID
    pub async fn anime_by_id(&self, mal_id: u32) -> Result<AnimeDetailResponse, FetchError> {
        self.get(&format!("/anime/{}", mal_id), &[]).await
    }

    /// Fetch a page of the all-time top anime list
    pub async fn top_anime(&self, page: u32) -> Result<SearchResponse, FetchError> {
        let params = vec![
            ("page", page.to_string()),
            ("limit", self.page_size.to_string()),
        ];
        self.get("/top/anime", &params).await
    }

    /// Fetch a page of the currently airing season
    pub async fn season_now(&self, page: u32) -> Result<SearchResponse, FetchError> {
        let params = vec![
            ("page", page.to_string()),
            ("limit", self.page_size.to_string()),
        ];
        self.get("/seasons/now", &params).await
    }
}

/// Extract a human-readable message from a non-success response body.
/// Jikan error bodies look like `{"status":404,"type":"...","message":"..."}`.
fn classify_http_failure(status: StatusCode, body: &str) -> FetchError {
    match serde_json::from_str::<JikanError>(body) {
        Ok(err) if !err.message.trim().is_empty() => FetchError::transport(err.message),
        _ => FetchError::transport(format!("{}: {}", FALLBACK_MESSAGE, status)),
    }
}
