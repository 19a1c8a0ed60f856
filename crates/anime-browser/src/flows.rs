//! Fetch orchestrators for the search view, the detail view and the
//! curated home sections.
//!
//! Orchestrators sequence coordinator calls in response to user input and
//! cross-context cache writes, and decide how failures surface: cancelled
//! calls vanish silently, rate limiting becomes an advisory, everything
//! else becomes an inline error the user can retry.

use crate::api::{Anime, SearchResponse};
use crate::debounce::{debounce, DebounceInput};
use crate::error::FetchError;
use crate::service::CatalogService;
use crate::watch::{CacheWatcher, Subscription};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Advisory shown when the catalog answers 429
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit reached. Please wait a moment and try again.";

/// Entries shown per curated section
const SECTION_SIZE: usize = 16;

/// User-visible search state
#[derive(Debug, Clone)]
pub struct SearchState {
    pub raw_query: String,
    pub settled_query: String,
    pub results: Vec<Anime>,
    pub loading: bool,
    pub error: Option<String>,
    pub current_page: u32,
    pub total_pages: u32,
    pub has_next_page: bool,
    pub selected_genre: Option<u32>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            raw_query: String::new(),
            settled_query: String::new(),
            results: Vec::new(),
            loading: false,
            error: None,
            current_page: 1,
            total_pages: 1,
            has_next_page: false,
            selected_genre: None,
        }
    }
}

/// Orchestrates the search view: debounced input, page/genre changes and
/// refreshes triggered by foreign cache writes
pub struct SearchFlow {
    service: Arc<CatalogService>,
    state: SearchState,
    input: DebounceInput<String>,
    settled: mpsc::UnboundedReceiver<String>,
    changes_tx: mpsc::UnboundedSender<(String, serde_json::Value)>,
    changes: mpsc::UnboundedReceiver<(String, serde_json::Value)>,
    _subscription: Option<Subscription>,
}

impl SearchFlow {
    /// Create a search flow with the given debounce delay
    pub fn new(service: Arc<CatalogService>, debounce_delay: Duration) -> Self {
        let (input, settled) = debounce(debounce_delay);
        let (changes_tx, changes) = mpsc::unbounded_channel();

        Self {
            service,
            state: SearchState::default(),
            input,
            settled,
            changes_tx,
            changes,
            _subscription: None,
        }
    }

    /// Refresh this flow's search whenever another context writes a
    /// search cache entry
    pub fn attach_watcher(&mut self, watcher: &CacheWatcher) {
        let tx = self.changes_tx.clone();
        self._subscription = Some(watcher.subscribe(move |key, value| {
            let _ = tx.send((key, value));
        }));
    }

    /// Current view state
    pub fn state(&self) -> &SearchState {
        &self.state
    }

    /// Whether raw input is still ahead of the settled query. UI feedback
    /// only; request suppression is the debouncer's job.
    pub fn is_debouncing(&self) -> bool {
        self.state.raw_query != self.state.settled_query
            && !self.state.raw_query.trim().is_empty()
    }

    /// Raw input changed; the search fires once the input settles
    pub fn set_query(&mut self, raw: &str) {
        self.state.raw_query = raw.to_string();
        if self.state.current_page != 1 {
            self.state.current_page = 1;
        }
        self.input.send(raw.to_string());
    }

    /// Jump to a page of the current search
    pub async fn set_page(&mut self, page: u32) {
        self.state.current_page = page;
        self.refresh().await;
    }

    /// Change the genre filter; resets to the first page
    pub async fn set_genre(&mut self, genre: Option<u32>) {
        self.state.selected_genre = genre;
        self.state.current_page = 1;
        self.refresh().await;
    }

    /// Drop query, results and errors, back to the idle view
    pub fn clear(&mut self) {
        self.state = SearchState::default();
    }

    /// Re-issue the current settled search: used for page changes, user
    /// retry and foreign cache writes
    pub async fn refresh(&mut self) {
        let query = self.state.settled_query.trim().to_string();
        if query.is_empty() {
            return;
        }

        self.state.loading = true;
        self.state.error = None;

        match self
            .service
            .search(&query, self.state.current_page, self.state.selected_genre)
            .await
        {
            Ok(fetched) => self.apply(fetched.data),
            Err(FetchError::Cancelled) => {
                // Superseded by newer input; a fresher call owns the state
                self.state.loading = false;
            }
            Err(FetchError::RateLimited) => {
                self.state.loading = false;
                self.state.error = Some(RATE_LIMIT_MESSAGE.to_string());
            }
            Err(FetchError::Transport { message }) => {
                self.state.loading = false;
                self.state.error = Some(message);
            }
        }
    }

    fn apply(&mut self, response: SearchResponse) {
        self.state.loading = false;
        self.state.error = None;
        self.state.results = response.data;
        self.state.total_pages = response.pagination.last_visible_page;
        self.state.has_next_page = response.pagination.has_next_page;
        self.state.current_page = response.pagination.current_page;
    }

    /// Await the next trigger (settled input or foreign cache write) and
    /// run the search it calls for. Returns false once both trigger
    /// sources are closed.
    pub async fn drive(&mut self) -> bool {
        tokio::select! {
            settled = self.settled.recv() => match settled {
                Some(query) => {
                    self.state.settled_query = query;
                    if !self.state.settled_query.trim().is_empty() {
                        self.refresh().await;
                    }
                    true
                }
                None => false,
            },
            change = self.changes.recv() => match change {
                Some((key, _value)) => {
                    if key.starts_with("search_") && !self.state.settled_query.trim().is_empty() {
                        debug!(key = %key, "Foreign search write observed, refreshing");
                        self.refresh().await;
                    }
                    true
                }
                None => false,
            },
        }
    }
}

/// User-visible detail state
#[derive(Debug, Clone, Default)]
pub struct DetailState {
    pub anime: Option<Anime>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Orchestrates the detail view.
///
/// Cloneable so `open` can run concurrently with navigation; a response
/// landing after `close` is discarded, never applied to state.
#[derive(Clone)]
pub struct DetailFlow {
    service: Arc<CatalogService>,
    state: Arc<Mutex<DetailState>>,
    nav_seq: Arc<AtomicU64>,
}

impl DetailFlow {
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self {
            service,
            state: Arc::new(Mutex::new(DetailState::default())),
            nav_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of the current view state
    pub fn state(&self) -> DetailState {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Load the detail view for an anime
    pub async fn open(&self, id: u32) {
        let seq = self.nav_seq.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.loading = true;
            state.error = None;
        }

        let result = self.service.anime_by_id(id).await;

        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if self.nav_seq.load(Ordering::SeqCst) != seq {
            debug!(id = id, "Detail response arrived after navigation, discarding");
            return;
        }

        state.loading = false;
        match result {
            Ok(fetched) => state.anime = Some(fetched.data),
            Err(FetchError::Cancelled) => {}
            Err(FetchError::RateLimited) => state.error = Some(RATE_LIMIT_MESSAGE.to_string()),
            Err(FetchError::Transport { message }) => state.error = Some(message),
        }
    }

    /// Navigate away: clear state regardless of in-flight status
    pub fn close(&self) {
        self.nav_seq.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        *state = DetailState::default();
    }
}

/// One curated home section
#[derive(Debug, Clone)]
pub struct SuggestionSection {
    pub title: String,
    pub entries: Vec<Anime>,
}

/// Load the curated home sections.
///
/// The two catalog calls are strictly ordered with at least one second
/// between issue times; the external rate budget does not allow firing
/// them concurrently.
pub async fn load_suggestions(
    service: &CatalogService,
    gap: Duration,
) -> Result<Vec<SuggestionSection>, FetchError> {
    let gap = gap.max(Duration::from_millis(1000));

    let top = service.top_anime(1).await?;
    tokio::time::sleep(gap).await;
    let seasonal = service.season_now(1).await?;

    let section = |title: &str, response: &SearchResponse| SuggestionSection {
        title: title.to_string(),
        entries: response.data.iter().take(SECTION_SIZE).cloned().collect(),
    };

    Ok(vec![
        section("Trending Now", &top.data),
        section("Top Rated Anime", &top.data),
        section("Airing This Season", &seasonal.data),
    ])
}
