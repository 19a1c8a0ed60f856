//! Anime browser CLI application.

use anime_browser::{AnimeBrowser, FetchError};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::Config;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the catalog
    Search {
        query: String,

        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Genre id filter; the request omits the filter entirely when
        /// this is not given
        #[arg(short, long)]
        genre: Option<u32>,
    },
    /// Show details for an anime by MAL id
    Detail { id: u32 },
    /// Show the curated home sections
    Suggestions,
    /// Print the cache footprint
    CacheSize,
    /// Remove every cached response
    ClearCache,
    /// Print cache writes made by other contexts until interrupted
    Watch,
    /// Incremental search driven by stdin lines (`:quit` to exit)
    Interactive,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    shared::logging::init(shared::LogConfig {
        log_dir: config.log_dir().to_string_lossy().to_string(),
        component: "anime-browser".to_string(),
        default_level: log_level,
        console: args.verbose,
        file: true,
        json_format: config.logging.json_format,
    })?;

    info!(config_file = %args.config.display(), "Anime browser starting");

    let browser = AnimeBrowser::from_config(&config).context("Failed to build client stack")?;

    match args.command {
        Command::Search { query, page, genre } => {
            match browser.search(&query, page, genre).await {
                Ok(fetched) => {
                    println!(
                        "{} results for \"{}\" (page {}/{}, {:?})",
                        fetched.data.data.len(),
                        query,
                        fetched.data.pagination.current_page,
                        fetched.data.pagination.last_visible_page,
                        fetched.origin,
                    );
                    for anime in &fetched.data.data {
                        println!(
                            "  {:>6}  {}  {}",
                            anime.mal_id,
                            anime
                                .score
                                .map(|s| format!("{:.2}", s))
                                .unwrap_or_else(|| "  -  ".to_string()),
                            anime.title,
                        );
                    }
                }
                Err(e) => report_fetch_error(e),
            }
        }

        Command::Detail { id } => match browser.detail(id).await {
            Ok(fetched) => {
                let anime = &fetched.data;
                println!("{} (MAL {})", anime.title, anime.mal_id);
                if let Some(english) = &anime.title_english {
                    println!("  English: {}", english);
                }
                if let Some(japanese) = &anime.title_japanese {
                    println!("  Japanese: {}", japanese);
                }
                if let Some(score) = anime.score {
                    println!("  Score: {:.2}", score);
                }
                if let Some(episodes) = anime.episodes {
                    println!("  Episodes: {}", episodes);
                }
                if let Some(status) = &anime.status {
                    println!("  Status: {}", status);
                }
                if !anime.genres.is_empty() {
                    let names: Vec<_> = anime.genres.iter().map(|g| g.name.as_str()).collect();
                    println!("  Genres: {}", names.join(", "));
                }
                if let Some(trailer) = anime.trailer.as_ref().and_then(|t| t.url.as_ref()) {
                    println!("  Trailer: {}", trailer);
                }
                if let Some(synopsis) = &anime.synopsis {
                    println!("\n{}", synopsis);
                }
            }
            Err(e) => report_fetch_error(e),
        },

        Command::Suggestions => match browser.suggestions().await {
            Ok(sections) => {
                for section in sections {
                    println!("== {} ==", section.title);
                    for anime in &section.entries {
                        println!("  {:>6}  {}", anime.mal_id, anime.title);
                    }
                }
            }
            Err(e) => report_fetch_error(e),
        },

        Command::CacheSize => {
            let stats = browser.cache_stats();
            println!(
                "{} entries, {}",
                stats.entries,
                format_bytes(stats.size_bytes)
            );
        }

        Command::ClearCache => {
            browser.clear_cache();
            println!("Cache cleared");
        }

        Command::Watch => {
            let _subscription = browser.on_cache_change(|key, _value| {
                println!("cache updated in another context: {}", key);
            });
            println!("Watching for foreign cache writes, Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for interrupt")?;
        }

        Command::Interactive => {
            run_interactive(&browser).await?;
        }
    }

    Ok(())
}

/// Incremental search: every stdin line is raw query input, results print
/// once the input settles and the request completes
async fn run_interactive(browser: &AnimeBrowser) -> Result<()> {
    let mut flow = browser.search_flow();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Type to search, `:quit` to exit");

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let input = line.trim();
                    if input == ":quit" {
                        break;
                    }
                    flow.set_query(input);
                }
                None => break,
            },
            progressed = flow.drive() => {
                if !progressed {
                    break;
                }
                let state = flow.state();
                if let Some(error) = &state.error {
                    println!("error: {}", error);
                } else if !state.settled_query.is_empty() {
                    println!(
                        "{} results for \"{}\" (page {}/{})",
                        state.results.len(),
                        state.settled_query,
                        state.current_page,
                        state.total_pages,
                    );
                    for anime in state.results.iter().take(10) {
                        println!("  {:>6}  {}", anime.mal_id, anime.title);
                    }
                }
            }
        }
    }

    Ok(())
}

fn report_fetch_error(error: FetchError) {
    match error {
        // A one-shot CLI call has nothing to supersede it; kept for completeness
        FetchError::Cancelled => {}
        FetchError::RateLimited => {
            eprintln!("The catalog is rate limiting requests; wait a moment and retry.")
        }
        FetchError::Transport { message } => eprintln!("error: {}", message),
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
