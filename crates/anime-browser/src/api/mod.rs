//! Jikan API v4 client implementation.
//!
//! This module provides a thin HTTP client for the Jikan API
//! (MyAnimeList unofficial API). Rate-limit responses are surfaced as a
//! distinct error kind rather than retried internally; pacing is the
//! caller's responsibility.

pub mod client;
pub mod types;

pub use client::JikanClient;
pub use types::*;
