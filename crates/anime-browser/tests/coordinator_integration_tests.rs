//! Integration tests for the request coordinator and the fetch flows,
//! running against a local catalog stand-in on a loopback socket.

use anime_browser::{
    flows::load_suggestions, AnimeBrowser, CacheStore, CatalogService, FetchError, JikanClient,
    Origin, TtlPolicy,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{timeout, Instant};

// == Mock catalog ==

#[derive(Debug, Clone)]
struct RecordedRequest {
    target: String,
    at: Instant,
}

type RequestLog = Arc<Mutex<Vec<RecordedRequest>>>;

/// Responder: request target -> (status, body, delay before responding)
type Responder = dyn Fn(&str) -> (u16, String, Duration) + Send + Sync;

/// Spawn a one-request-per-connection HTTP stand-in for the catalog API.
/// Requests are logged at arrival time.
async fn spawn_catalog(respond: impl Fn(&str) -> (u16, String, Duration) + Send + Sync + 'static)
    -> (String, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let respond: Arc<Responder> = Arc::new(respond);

    let accept_log = Arc::clone(&log);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let log = Arc::clone(&accept_log);
            let respond = Arc::clone(&respond);

            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    return;
                }

                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let target = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("")
                    .to_string();

                log.lock().unwrap().push(RecordedRequest {
                    target: target.clone(),
                    at: Instant::now(),
                });

                let (status, body, delay) = respond(&target);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    429 => "Too Many Requests",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    (format!("http://{}", addr), log)
}

fn anime_json(mal_id: u32, title: &str) -> serde_json::Value {
    serde_json::json!({
        "mal_id": mal_id,
        "url": format!("https://myanimelist.net/anime/{}", mal_id),
        "images": { "jpg": {} },
        "title": title,
        "type": "TV",
        "episodes": 26,
        "score": 8.1
    })
}

fn list_body(titles: &[&str]) -> String {
    let data: Vec<_> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| anime_json(i as u32 + 1, title))
        .collect();
    serde_json::json!({
        "data": data,
        "pagination": {
            "last_visible_page": 3,
            "has_next_page": true,
            "current_page": 1
        }
    })
    .to_string()
}

fn detail_body(mal_id: u32, title: &str) -> String {
    serde_json::json!({ "data": anime_json(mal_id, title) }).to_string()
}

fn make_service(base_url: &str, cache_dir: &Path) -> Arc<CatalogService> {
    let client =
        JikanClient::new(base_url.to_string(), 24, Duration::from_secs(5)).unwrap();
    let cache = CacheStore::new(cache_dir, "av_", true).unwrap();
    Arc::new(CatalogService::new(client, cache, TtlPolicy::default()))
}

fn test_config(base_url: &str, root: &Path) -> shared::Config {
    let mut config = shared::Config::default();
    config.data.root_dir = root.to_string_lossy().to_string();
    config.api.base_url = base_url.to_string();
    config.cache.watch_interval_ms = 25;
    config.search.debounce_ms = 50;
    config
}

// == Coordinator tests ==

#[tokio::test]
async fn test_superseded_search_is_cancelled() {
    let (base_url, _log) = spawn_catalog(|target| {
        if target.contains("naruto") {
            (200, list_body(&["Naruto"]), Duration::from_millis(400))
        } else {
            (200, list_body(&["One Piece"]), Duration::ZERO)
        }
    })
    .await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let service = make_service(&base_url, temp_dir.path());

    let slow = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.search("naruto", 1, None).await })
    };
    // Let the first request reach the wire before superseding it
    tokio::time::sleep(Duration::from_millis(100)).await;

    let fresh = service.search("one piece", 1, None).await.unwrap();
    assert_eq!(fresh.data.data[0].title, "One Piece");

    let stale = slow.await.unwrap();
    assert_eq!(stale.unwrap_err(), FetchError::Cancelled);
}

#[tokio::test]
async fn test_write_through_then_cache_satisfied() {
    let (base_url, log) =
        spawn_catalog(|_| (200, list_body(&["Bleach"]), Duration::ZERO)).await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let service = make_service(&base_url, temp_dir.path());

    let first = service.search("bleach", 1, None).await.unwrap();
    assert_eq!(first.origin, Origin::Network);

    let second = service.search("bleach", 1, None).await.unwrap();
    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(second.data.data[0].title, "Bleach");

    assert_eq!(log.lock().unwrap().len(), 1, "cache hit must not touch the network");
}

#[tokio::test]
async fn test_genre_filter_is_a_distinct_request() {
    let (base_url, log) =
        spawn_catalog(|_| (200, list_body(&["Bleach"]), Duration::ZERO)).await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let service = make_service(&base_url, temp_dir.path());

    service.search("bleach", 1, None).await.unwrap();
    service.search("bleach", 1, Some(5)).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2, "a genre filter must not be answered by the unfiltered entry");
    assert!(!log[0].target.contains("genres="));
    assert!(log[1].target.contains("genres=5"));
}

#[tokio::test]
async fn test_rate_limit_is_classified_distinctly() {
    let (base_url, _log) = spawn_catalog(|_| {
        (429, r#"{"status":429,"type":"RateLimitException","message":"too many"}"#.to_string(), Duration::ZERO)
    })
    .await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let service = make_service(&base_url, temp_dir.path());

    let result = service.top_anime(1).await;
    assert_eq!(result.unwrap_err(), FetchError::RateLimited);
}

#[tokio::test]
async fn test_error_message_extracted_from_body() {
    let (base_url, _log) = spawn_catalog(|_| {
        (
            404,
            r#"{"status":404,"type":"BadResponseException","message":"Resource does not exist"}"#
                .to_string(),
            Duration::ZERO,
        )
    })
    .await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let service = make_service(&base_url, temp_dir.path());

    match service.anime_by_id(99999).await {
        Err(FetchError::Transport { message }) => {
            assert_eq!(message, "Resource does not exist")
        }
        other => panic!("expected transport failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_suggestions_are_paced_and_sectioned() {
    let titles: Vec<String> = (1..=20).map(|i| format!("Anime {}", i)).collect();
    let title_refs: Vec<&str> = titles.iter().map(|s| s.as_str()).collect();
    let body = list_body(&title_refs);

    let (base_url, log) = spawn_catalog(move |_| (200, body.clone(), Duration::ZERO)).await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let service = make_service(&base_url, temp_dir.path());

    let sections = load_suggestions(&service, Duration::from_millis(1000))
        .await
        .unwrap();

    assert_eq!(sections.len(), 3);
    assert_eq!(sections[0].title, "Trending Now");
    assert_eq!(sections[1].title, "Top Rated Anime");
    assert_eq!(sections[2].title, "Airing This Season");
    for section in &sections {
        assert_eq!(section.entries.len(), 16);
    }

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert!(log[0].target.starts_with("/top/anime"));
    assert!(log[1].target.starts_with("/seasons/now"));
    let gap = log[1].at.duration_since(log[0].at);
    assert!(
        gap >= Duration::from_millis(1000),
        "suggestion requests must be at least a second apart, got {:?}",
        gap
    );
}

// == Flow tests ==

#[tokio::test]
async fn test_fast_typing_issues_only_the_settled_search() {
    let (base_url, log) = spawn_catalog(|target| {
        if target.contains("one") {
            (200, list_body(&["One Piece"]), Duration::ZERO)
        } else {
            (200, list_body(&["Naruto"]), Duration::ZERO)
        }
    })
    .await;

    let root = tempfile::TempDir::new().unwrap();
    let browser = AnimeBrowser::from_config(&test_config(&base_url, root.path())).unwrap();
    let mut flow = browser.search_flow();

    flow.set_query("naruto");
    flow.set_query("one piece");

    assert!(timeout(Duration::from_secs(5), flow.drive()).await.unwrap());

    let state = flow.state();
    assert_eq!(state.settled_query, "one piece");
    assert_eq!(state.results[0].title, "One Piece");
    assert!(state.error.is_none());

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1, "the superseded raw input must never reach the wire");
    assert!(log[0].target.contains("one"));
}

#[tokio::test]
async fn test_foreign_cache_write_refreshes_search_flow() {
    let (base_url, log) =
        spawn_catalog(|_| (200, list_body(&["Naruto"]), Duration::ZERO)).await;

    let root = tempfile::TempDir::new().unwrap();
    let config = test_config(&base_url, root.path());
    let browser = AnimeBrowser::from_config(&config).unwrap();
    let mut flow = browser.search_flow();

    flow.set_query("naruto");
    assert!(timeout(Duration::from_secs(5), flow.drive()).await.unwrap());
    assert_eq!(flow.state().results[0].title, "Naruto");
    assert_eq!(log.lock().unwrap().len(), 1);

    // Another context refreshes the same search entry
    let foreign = CacheStore::new(config.cache_dir(), config.cache.prefix.clone(), true).unwrap();
    let refreshed: anime_browser::SearchResponse =
        serde_json::from_str(&list_body(&["Naruto Kai"])).unwrap();
    foreign.set("search_naruto_1", &refreshed, 30);

    assert!(timeout(Duration::from_secs(5), flow.drive()).await.unwrap());

    let state = flow.state();
    assert_eq!(
        state.results[0].title, "Naruto Kai",
        "the flow should pick up the foreign write"
    );
    assert_eq!(
        log.lock().unwrap().len(),
        1,
        "the refresh is satisfied by the fresh foreign entry, not the network"
    );
}

#[tokio::test]
async fn test_detail_response_after_close_is_discarded() {
    let (base_url, _log) = spawn_catalog(|_| {
        (200, detail_body(20, "Naruto"), Duration::from_millis(300))
    })
    .await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let service = make_service(&base_url, temp_dir.path());
    let flow = anime_browser::DetailFlow::new(service);

    let opener = {
        let flow = flow.clone();
        tokio::spawn(async move { flow.open(20).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Navigate away while the response is still in flight
    flow.close();
    opener.await.unwrap();

    let state = flow.state();
    assert!(state.anime.is_none(), "a stale response must never be applied");
    assert!(!state.loading);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_detail_open_populates_state() {
    let (base_url, _log) =
        spawn_catalog(|_| (200, detail_body(20, "Naruto"), Duration::ZERO)).await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let service = make_service(&base_url, temp_dir.path());
    let flow = anime_browser::DetailFlow::new(service);

    flow.open(20).await;

    let state = flow.state();
    assert_eq!(state.anime.as_ref().unwrap().title, "Naruto");
    assert!(!state.loading);
}

#[tokio::test]
async fn test_rate_limited_search_sets_advisory_message() {
    let (base_url, _log) = spawn_catalog(|_| (429, String::new(), Duration::ZERO)).await;

    let root = tempfile::TempDir::new().unwrap();
    let browser = AnimeBrowser::from_config(&test_config(&base_url, root.path())).unwrap();
    let mut flow = browser.search_flow();

    flow.set_query("naruto");
    assert!(timeout(Duration::from_secs(5), flow.drive()).await.unwrap());

    let state = flow.state();
    assert_eq!(
        state.error.as_deref(),
        Some(anime_browser::flows::RATE_LIMIT_MESSAGE)
    );
    assert!(state.results.is_empty());
}
