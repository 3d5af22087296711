use std::collections::HashMap;
use std::future::Future;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::TOKEN_TTL;
use crate::http::{HttpClient, HttpError};
use crate::types::SearchMode;

static SEL_VIEWSTATE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[name="__VIEWSTATE"]"#).expect("invalid selector: viewstate")
});

static SEL_EVENTVALIDATION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[name="__EVENTVALIDATION"]"#).expect("invalid selector: eventvalidation")
});

/// ASP.NET anti-forgery values echoed back on form submission. Either field
/// may be empty; the portal omits them on some pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPair {
    pub viewstate: String,
    pub event_validation: String,
}

#[derive(Debug)]
struct StoredPair {
    tokens: TokenPair,
    fetched_at: Instant,
}

/// Per-search-mode cache of anti-forgery token pairs. The mutex is held
/// across the whole check-fetch-store sequence so concurrent callers for the
/// same window share a single refresh.
#[derive(Debug, Default)]
pub struct TokenStore {
    slots: Mutex<HashMap<SearchMode, StoredPair>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached pair for `mode` when younger than the freshness
    /// window, otherwise refreshes it from the mode's search page.
    pub async fn get(&self, mode: SearchMode, http: &HttpClient, search_url: &str) -> TokenPair {
        self.get_with(mode, || fetch_tokens(http, search_url, mode)).await
    }

    pub async fn get_with<F, Fut>(&self, mode: SearchMode, fetch: F) -> TokenPair
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenPair, HttpError>>,
    {
        let mut slots = self.slots.lock().await;
        if let Some(stored) = slots.get(&mode) {
            if stored.fetched_at.elapsed() < TOKEN_TTL {
                debug!(mode = mode.mode_param(), "reusing cached form tokens");
                return stored.tokens.clone();
            }
        }
        match fetch().await {
            Ok(tokens) => {
                slots.insert(
                    mode,
                    StoredPair {
                        tokens: tokens.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                tokens
            }
            Err(err) => {
                // Proceed with empty tokens; a rejected submission surfaces
                // as an HTTP error on the search call itself.
                warn!(mode = mode.mode_param(), error = %err, "failed to refresh form tokens");
                TokenPair::default()
            }
        }
    }
}

async fn fetch_tokens(
    http: &HttpClient,
    search_url: &str,
    mode: SearchMode,
) -> Result<TokenPair, HttpError> {
    let url = format!("{}?mode={}", search_url, mode.mode_param());
    let response = http.get(&url).await?;
    Ok(parse_form_tokens(&response.body))
}

/// Extracts the two hidden anti-forgery inputs; a missing input yields an
/// empty string, which is not an error.
pub fn parse_form_tokens(html: &str) -> TokenPair {
    let document = Html::parse_document(html);
    let input_value = |selector: &Selector| {
        document
            .select(selector)
            .next()
            .and_then(|input| input.value().attr("value"))
            .unwrap_or_default()
            .to_string()
    };
    TokenPair {
        viewstate: input_value(&SEL_VIEWSTATE),
        event_validation: input_value(&SEL_EVENTVALIDATION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const FORM_PAGE: &str = r#"
        <html><body>
        <form>
        <input type="hidden" name="__VIEWSTATE" value="vs-abc123" />
        <input type="hidden" name="__EVENTVALIDATION" value="ev-def456" />
        </form>
        </body></html>
    "#;

    #[test]
    fn parses_both_hidden_inputs() {
        let pair = parse_form_tokens(FORM_PAGE);
        assert_eq!(pair.viewstate, "vs-abc123");
        assert_eq!(pair.event_validation, "ev-def456");
    }

    #[test]
    fn missing_inputs_become_empty_strings() {
        let pair = parse_form_tokens("<html><body><p>no form here</p></body></html>");
        assert_eq!(pair, TokenPair::default());

        let pair = parse_form_tokens(
            r#"<input name="__VIEWSTATE" value="only-vs" />"#,
        );
        assert_eq!(pair.viewstate, "only-vs");
        assert_eq!(pair.event_validation, "");
    }

    fn pair(viewstate: &str) -> TokenPair {
        TokenPair {
            viewstate: viewstate.to_string(),
            event_validation: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_tokens_are_reused_without_refetching() {
        let store = TokenStore::new();
        let fetches = AtomicU32::new(0);
        let fetch = || {
            fetches.fetch_add(1, Ordering::SeqCst);
            async { Ok(pair("first")) }
        };

        let first = store.get_with(SearchMode::Owner, fetch).await;
        let second = store.get_with(SearchMode::Owner, fetch).await;

        assert_eq!(first.viewstate, "first");
        assert_eq!(second.viewstate, "first");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_tokens_are_refreshed() {
        let store = TokenStore::new();
        let fetches = AtomicU32::new(0);
        let fetch = || {
            let n = fetches.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(pair(&format!("fetch-{n}"))) }
        };

        let first = store.get_with(SearchMode::Address, fetch).await;
        tokio::time::sleep(Duration::from_secs(16 * 60)).await;
        let second = store.get_with(SearchMode::Address, fetch).await;

        assert_eq!(first.viewstate, "fetch-1");
        assert_eq!(second.viewstate, "fetch-2");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn modes_have_independent_slots() {
        let store = TokenStore::new();
        let fetches = AtomicU32::new(0);
        let fetch = || {
            fetches.fetch_add(1, Ordering::SeqCst);
            async { Ok(pair("x")) }
        };

        store.get_with(SearchMode::Owner, fetch).await;
        store.get_with(SearchMode::Parcel, fetch).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_yields_empty_pair_and_is_not_cached() {
        let store = TokenStore::new();
        let fetches = AtomicU32::new(0);

        let failed = store
            .get_with(SearchMode::Owner, || {
                fetches.fetch_add(1, Ordering::SeqCst);
                async { Err(HttpError::Status(500)) }
            })
            .await;
        assert_eq!(failed, TokenPair::default());

        // The failure was not stored, so the next call fetches again.
        let recovered = store
            .get_with(SearchMode::Owner, || {
                fetches.fetch_add(1, Ordering::SeqCst);
                async { Ok(pair("recovered")) }
            })
            .await;
        assert_eq!(recovered.viewstate, "recovered");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
