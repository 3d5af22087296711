use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, Instrument};

use crate::scraper::PropertySearcher;
use crate::types::{
    CacheCleared, CacheDisabled, ClearCacheReply, StatusFailure, StatusReply, SystemStatus,
};
use crate::{request_id, AppState};

/// Probes the portal root. Available means HTTP 200, no maintenance banner,
/// and recognizably property/tax-related content.
pub async fn check_system_status(state: &Arc<AppState>) -> StatusReply {
    let span = tracing::info_span!("status", request_id = %request_id());
    async move {
        info!("checking portal availability");
        let searcher = match PropertySearcher::new(
            &state.settings,
            state.limiter.clone(),
            state.tokens.clone(),
        ) {
            Ok(searcher) => searcher,
            Err(err) => {
                error!(error = %err, "failed to construct searcher");
                return StatusReply::Unavailable(StatusFailure::general(err.to_string()));
            }
        };

        let started = Instant::now();
        match searcher.portal_root().await {
            Ok(response) => {
                let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;
                let content = response.body.to_lowercase();
                let maintenance_mode = content.contains("maintenance");
                let has_property_system = content.contains("property")
                    && (content.contains("tax") || content.contains("search"));
                let title_check = content.contains("tax") || content.contains("property");
                let has_expected_content = has_property_system || title_check;

                StatusReply::Available(SystemStatus {
                    system_available: !maintenance_mode
                        && response.status == 200
                        && has_expected_content,
                    status_code: response.status,
                    maintenance_mode,
                    has_expected_content,
                    response_time_ms,
                    check_timestamp: Utc::now().to_rfc3339(),
                })
            }
            Err(err) => {
                error!(error = %err, "portal status check failed");
                StatusReply::Unavailable(StatusFailure::http(&err))
            }
        }
    }
    .instrument(span)
    .await
}

/// Static capability and configuration descriptor; no network call.
pub fn get_search_capabilities(state: &AppState) -> serde_json::Value {
    let settings = &state.settings;
    let cached = settings.cache_enabled;
    serde_json::json!({
        "search_types": [
            {
                "type": "owner",
                "description": "Search by property owner name",
                "parameters": ["owner_name"],
                "cached": cached,
            },
            {
                "type": "address",
                "description": "Search by property address",
                "parameters": ["address"],
                "cached": cached,
            },
            {
                "type": "parcel_id",
                "description": "Search by parcel identification number",
                "parameters": ["parcel_id"],
                "cached": cached,
            },
            {
                "type": "property_details",
                "description": "Get detailed property information including assessments and ownership",
                "parameters": ["parcel_id"],
                "cached": cached,
            },
        ],
        "data_fields": [
            "parcel_id",
            "owner_name",
            "property_address",
            "tax_value",
            "detail_url",
            "search_timestamp",
        ],
        "configuration": {
            "base_url": settings.base_url,
            "cache_enabled": cached,
            "cache_duration_hours": settings.cache_duration.as_secs() / 3600,
            "rate_limit_enabled": settings.rate_limit_enabled,
            "rate_limit_delay": settings.rate_limit_delay.as_secs_f64(),
            "max_results": settings.max_results,
            "retry_attempts": settings.retry_attempts,
        },
        "system_info": "New Hanover County property tax search",
    })
}

/// Clears the selected cache categories. Each category clears independently,
/// so one category never blocks the others.
pub fn clear_cache(state: &AppState, cache_type: &str) -> ClearCacheReply {
    if !state.settings.cache_enabled {
        return ClearCacheReply::Disabled(CacheDisabled {
            success: false,
            error: "Caching is disabled".to_string(),
            cache_enabled: false,
        });
    }

    info!(cache_type, "clearing cache");
    let mut cleared_caches = Vec::new();
    if matches!(cache_type, "all" | "owner") {
        state.owner_cache.clear();
        cleared_caches.push("owner");
    }
    if matches!(cache_type, "all" | "address") {
        state.address_cache.clear();
        cleared_caches.push("address");
    }
    if matches!(cache_type, "all" | "parcel") {
        state.parcel_cache.clear();
        cleared_caches.push("parcel");
    }
    if matches!(cache_type, "all" | "detail") {
        state.detail_cache.clear();
        cleared_caches.push("detail");
    }

    ClearCacheReply::Cleared(CacheCleared {
        success: true,
        cleared_caches,
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::types::{PropertyRecord, SearchResponse};

    fn sample_response(search_type: &'static str, query: &str) -> SearchResponse {
        SearchResponse {
            success: true,
            search_type,
            query: query.to_string(),
            results_count: 1,
            properties: vec![PropertyRecord {
                parcel_id: "1".to_string(),
                owner_name: "SMITH".to_string(),
                property_address: None,
                tax_value: None,
                detail_url: None,
                search_timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            }],
            truncated: false,
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn capabilities_list_all_four_search_types() {
        let state = AppState::new(Settings::default());
        let capabilities = get_search_capabilities(&state);
        assert_eq!(capabilities["search_types"].as_array().unwrap().len(), 4);
        assert_eq!(capabilities["configuration"]["max_results"], 500);
        assert_eq!(capabilities["configuration"]["retry_attempts"], 3);
        assert_eq!(
            capabilities["data_fields"].as_array().unwrap().len(),
            6
        );
    }

    #[tokio::test]
    async fn clearing_one_category_leaves_the_others_intact() {
        let state = AppState::new(Settings::default());
        state
            .owner_cache
            .insert("SMITH".to_string(), sample_response("owner", "SMITH"))
            .await;
        state
            .address_cache
            .insert("123 MAIN ST".to_string(), sample_response("address", "123 MAIN ST"))
            .await;

        let reply = clear_cache(&state, "owner");
        match reply {
            ClearCacheReply::Cleared(cleared) => {
                assert_eq!(cleared.cleared_caches, vec!["owner"]);
            }
            ClearCacheReply::Disabled(_) => panic!("cache should be enabled"),
        }

        assert!(state.owner_cache.get("SMITH").await.is_none());
        assert!(state.address_cache.get("123 MAIN ST").await.is_some());
    }

    #[tokio::test]
    async fn clear_all_empties_every_category() {
        let state = AppState::new(Settings::default());
        state
            .parcel_cache
            .insert("42".to_string(), sample_response("parcel_id", "42"))
            .await;

        match clear_cache(&state, "all") {
            ClearCacheReply::Cleared(cleared) => {
                assert_eq!(cleared.cleared_caches, vec!["owner", "address", "parcel", "detail"]);
            }
            ClearCacheReply::Disabled(_) => panic!("cache should be enabled"),
        }
        assert!(state.parcel_cache.get("42").await.is_none());
    }

    #[test]
    fn clear_with_caching_disabled_reports_failure() {
        let settings = Settings {
            cache_enabled: false,
            ..Settings::default()
        };
        let state = AppState::new(settings);
        match clear_cache(&state, "all") {
            ClearCacheReply::Disabled(disabled) => {
                assert!(!disabled.success);
                assert!(!disabled.cache_enabled);
            }
            ClearCacheReply::Cleared(_) => panic!("expected disabled reply"),
        }
    }

    #[test]
    fn unknown_category_clears_nothing() {
        let state = AppState::new(Settings::default());
        match clear_cache(&state, "bogus") {
            ClearCacheReply::Cleared(cleared) => assert!(cleared.cleared_caches.is_empty()),
            ClearCacheReply::Disabled(_) => panic!("cache should be enabled"),
        }
    }
}
