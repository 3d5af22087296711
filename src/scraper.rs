use std::sync::Arc;

use tracing::{error, info};

use crate::config::Settings;
use crate::http::{HttpClient, HttpError, PortalResponse};
use crate::parser;
use crate::rate_limit::RateLimiter;
use crate::tokens::TokenStore;
use crate::types::{PropertyDetail, PropertyRecord, SearchMode};

// Form field names from the portal's ASP.NET search page.
const FIELD_OWNER: &str = "ctl00$cphPage$txtOwner";
const FIELD_ADDRESS: &str = "ctl00$cphPage$txtAddress";
const FIELD_PARCEL: &str = "ctl00$cphPage$txtParID";
const FIELD_SUBMIT: &str = "ctl00$cphPage$btnSearch";

/// Client for the county tax portal's stateful search forms.
///
/// Each top-level tool invocation builds its own searcher; the token store
/// and rate limiter are process-wide and shared through `Arc`s.
#[derive(Debug, Clone)]
pub struct PropertySearcher {
    http: HttpClient,
    tokens: Arc<TokenStore>,
    base_url: String,
    search_url: String,
}

impl PropertySearcher {
    pub fn new(
        settings: &Settings,
        limiter: Arc<RateLimiter>,
        tokens: Arc<TokenStore>,
    ) -> Result<Self, HttpError> {
        Ok(Self {
            http: HttpClient::new(settings, limiter)?,
            tokens,
            base_url: settings.base_url.clone(),
            search_url: settings.search_url(),
        })
    }

    pub async fn search_by_owner(&self, owner_name: &str) -> Result<Vec<PropertyRecord>, HttpError> {
        self.submit_search(SearchMode::Owner, FIELD_OWNER, owner_name).await
    }

    pub async fn search_by_address(&self, address: &str) -> Result<Vec<PropertyRecord>, HttpError> {
        self.submit_search(SearchMode::Address, FIELD_ADDRESS, address).await
    }

    pub async fn search_by_parcel_id(&self, parcel_id: &str) -> Result<Vec<PropertyRecord>, HttpError> {
        self.submit_search(SearchMode::Parcel, FIELD_PARCEL, parcel_id).await
    }

    async fn submit_search(
        &self,
        mode: SearchMode,
        field: &str,
        query: &str,
    ) -> Result<Vec<PropertyRecord>, HttpError> {
        let tokens = self.tokens.get(mode, &self.http, &self.search_url).await;
        let form = vec![
            ("__VIEWSTATE".to_string(), tokens.viewstate),
            ("__EVENTVALIDATION".to_string(), tokens.event_validation),
            (field.to_string(), query.to_string()),
            (FIELD_SUBMIT.to_string(), "Search".to_string()),
        ];
        let url = format!("{}?mode={}", self.search_url, mode.mode_param());
        let response = self.http.post_form(&url, &form).await?;

        let results = parser::parse_search_results(&response.body, &self.base_url);
        info!(
            mode = mode.mode_param(),
            count = results.records.len(),
            outcome = ?results.outcome,
            "search response parsed"
        );
        Ok(results.records)
    }

    /// Fetches and parses a detail page. Never fails: a fetch error is folded
    /// into a minimal record so per-row batch lookups stay isolated.
    pub async fn parcel_details(&self, detail_url: &str) -> PropertyDetail {
        match self.http.get(detail_url).await {
            Ok(response) => parser::parse_property_detail(&response.body, detail_url),
            Err(err) => {
                error!(url = detail_url, error = %err, "failed to scrape detail page");
                PropertyDetail::failed(detail_url, err.to_string())
            }
        }
    }

    /// GET the portal root, for the availability check.
    pub async fn portal_root(&self) -> Result<PortalResponse, HttpError> {
        self.http.get(&self.base_url).await
    }
}
