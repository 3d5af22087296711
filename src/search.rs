use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn, Instrument};

use crate::http::HttpError;
use crate::scraper::PropertySearcher;
use crate::types::{ErrorEnvelope, PropertyRecord, SearchMode, SearchReply, SearchResponse};
use crate::{request_id, AppState};

pub async fn search_property_by_owner(state: &Arc<AppState>, owner_name: &str) -> SearchReply {
    run_search(state, SearchMode::Owner, owner_name, |searcher| async move {
        searcher.search_by_owner(owner_name).await
    })
    .await
}

pub async fn search_property_by_address(state: &Arc<AppState>, address: &str) -> SearchReply {
    run_search(state, SearchMode::Address, address, |searcher| async move {
        searcher.search_by_address(address).await
    })
    .await
}

pub async fn search_property_by_parcel_id(state: &Arc<AppState>, parcel_id: &str) -> SearchReply {
    run_search(state, SearchMode::Parcel, parcel_id, |searcher| async move {
        searcher.search_by_parcel_id(parcel_id).await
    })
    .await
}

/// Shared search flow: cache lookup, fresh searcher, portal query, result
/// limiting, envelope construction, cache fill. Failures become envelopes;
/// nothing escapes to the transport.
async fn run_search<F, Fut>(
    state: &Arc<AppState>,
    mode: SearchMode,
    query: &str,
    search: F,
) -> SearchReply
where
    F: FnOnce(PropertySearcher) -> Fut,
    Fut: Future<Output = Result<Vec<PropertyRecord>, HttpError>>,
{
    let span = tracing::info_span!(
        "search",
        request_id = %request_id(),
        search_type = mode.search_type()
    );
    async move {
        let cache = state.search_cache(mode);
        if let Some(cached) = cache.get(query).await {
            info!(query, "returning cached results");
            return SearchReply::Results(cached);
        }

        info!(query, "searching portal");
        let searcher = match PropertySearcher::new(
            &state.settings,
            state.limiter.clone(),
            state.tokens.clone(),
        ) {
            Ok(searcher) => searcher,
            Err(err) => {
                error!(error = %err, "failed to construct searcher");
                return SearchReply::Failed(
                    ErrorEnvelope::general(err.to_string()).for_search(mode, query),
                );
            }
        };

        match search(searcher).await {
            Ok(mut records) => {
                let max_results = state.settings.max_results;
                if records.len() > max_results {
                    warn!(
                        total = records.len(),
                        max_results, "truncating oversized result set"
                    );
                    records.truncate(max_results);
                }
                let response = SearchResponse {
                    success: true,
                    search_type: mode.search_type(),
                    query: query.to_string(),
                    results_count: records.len(),
                    truncated: records.len() == max_results,
                    properties: records,
                    timestamp: Utc::now().to_rfc3339(),
                };
                cache.insert(query.to_string(), response.clone()).await;
                SearchReply::Results(response)
            }
            Err(err) => {
                error!(query, error = %err, "portal search failed");
                SearchReply::Failed(ErrorEnvelope::http(&err).for_search(mode, query))
            }
        }
    }
    .instrument(span)
    .await
}
