pub mod cache;
pub mod config;
pub mod details;
pub mod http;
pub mod mcp;
pub mod parser;
pub mod rate_limit;
pub mod scraper;
pub mod search;
pub mod stdio_service;
pub mod system;
pub mod tokens;
pub mod types;

use std::sync::Arc;

use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::config::Settings;
use crate::rate_limit::RateLimiter;
use crate::tokens::TokenStore;
use crate::types::{DetailResponse, SearchMode, SearchResponse};

// Re-export the response types for easy access
pub use types::*;

/// Shared process-wide state: configuration, the token store and rate
/// limiter every searcher borrows, and one response cache per query
/// category.
#[derive(Debug)]
pub struct AppState {
    pub settings: Settings,
    pub limiter: Arc<RateLimiter>,
    pub tokens: Arc<TokenStore>,
    pub owner_cache: ResponseCache<SearchResponse>,
    pub address_cache: ResponseCache<SearchResponse>,
    pub parcel_cache: ResponseCache<SearchResponse>,
    pub detail_cache: ResponseCache<DetailResponse>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let limiter = Arc::new(RateLimiter::from_settings(&settings));
        let tokens = Arc::new(TokenStore::new());
        let search_cache = || {
            ResponseCache::new(
                settings.cache_enabled,
                settings.cache_max_size,
                settings.cache_duration,
            )
        };
        Self {
            limiter,
            tokens,
            owner_cache: search_cache(),
            address_cache: search_cache(),
            parcel_cache: search_cache(),
            detail_cache: ResponseCache::new(
                settings.cache_enabled,
                settings.cache_max_size,
                settings.cache_duration,
            ),
            settings,
        }
    }

    pub fn search_cache(&self, mode: SearchMode) -> &ResponseCache<SearchResponse> {
        match mode {
            SearchMode::Owner => &self.owner_cache,
            SearchMode::Address => &self.address_cache,
            SearchMode::Parcel | SearchMode::Advanced => &self.parcel_cache,
        }
    }
}

/// Short correlation id stamped on every tool invocation's log span.
pub(crate) fn request_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
