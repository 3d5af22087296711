use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, Instrument};

use crate::scraper::PropertySearcher;
use crate::types::{DetailReply, DetailResponse, ErrorEnvelope};
use crate::{request_id, AppState};

/// Full property lookup for one parcel: re-search by parcel id to locate the
/// row's detail link, then scrape the detail page behind it.
pub async fn get_property_details(state: &Arc<AppState>, parcel_id: &str) -> DetailReply {
    let span = tracing::info_span!("details", request_id = %request_id());
    async move {
        if let Some(cached) = state.detail_cache.get(parcel_id).await {
            info!(parcel_id, "returning cached details");
            return DetailReply::Details(cached);
        }

        info!(parcel_id, "fetching property details");
        let searcher = match PropertySearcher::new(
            &state.settings,
            state.limiter.clone(),
            state.tokens.clone(),
        ) {
            Ok(searcher) => searcher,
            Err(err) => {
                error!(error = %err, "failed to construct searcher");
                return DetailReply::Failed(
                    ErrorEnvelope::general(err.to_string()).for_parcel(parcel_id),
                );
            }
        };

        let results = match searcher.search_by_parcel_id(parcel_id).await {
            Ok(results) => results,
            Err(err) => {
                error!(parcel_id, error = %err, "parcel lookup failed");
                return DetailReply::Failed(ErrorEnvelope::http(&err).for_parcel(parcel_id));
            }
        };

        let Some(basic_info) = results.into_iter().next() else {
            info!(parcel_id, "parcel search returned no rows");
            return DetailReply::Failed(ErrorEnvelope::not_found(parcel_id));
        };
        let Some(detail_url) = basic_info.detail_url.clone() else {
            info!(parcel_id, "result row carries no detail link");
            return DetailReply::Failed(ErrorEnvelope::no_detail_url(parcel_id, basic_info));
        };

        let detailed_info = searcher.parcel_details(&detail_url).await;
        let response = DetailResponse {
            success: true,
            parcel_id: parcel_id.to_string(),
            basic_info,
            detailed_info,
            timestamp: Utc::now().to_rfc3339(),
        };
        state
            .detail_cache
            .insert(parcel_id.to_string(), response.clone())
            .await;
        DetailReply::Details(response)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::types::{PropertyDetail, PropertyRecord};

    fn sample_detail(parcel_id: &str) -> DetailResponse {
        DetailResponse {
            success: true,
            parcel_id: parcel_id.to_string(),
            basic_info: PropertyRecord {
                parcel_id: parcel_id.to_string(),
                owner_name: "SMITH JOHN".to_string(),
                property_address: None,
                tax_value: None,
                detail_url: Some("https://etax.nhcgov.com/detail.aspx?id=1".to_string()),
                search_timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            },
            detailed_info: PropertyDetail::new("https://etax.nhcgov.com/detail.aspx?id=1"),
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn cached_details_short_circuit_the_portal() {
        let state = Arc::new(AppState::new(Settings::default()));
        state
            .detail_cache
            .insert("123456".to_string(), sample_detail("123456"))
            .await;

        match get_property_details(&state, "123456").await {
            DetailReply::Details(response) => {
                assert!(response.success);
                assert_eq!(response.parcel_id, "123456");
            }
            DetailReply::Failed(envelope) => panic!("unexpected failure: {}", envelope.error),
        }
    }
}
