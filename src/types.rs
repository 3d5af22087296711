use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::http::HttpError;

/// Which portal form a query targets. Each mode has its own token slot in
/// the [`TokenStore`](crate::tokens::TokenStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
    Owner,
    Address,
    Parcel,
    Advanced,
}

impl SearchMode {
    /// Value of the `?mode=` query parameter on the portal search page.
    pub fn mode_param(self) -> &'static str {
        match self {
            SearchMode::Owner => "owner",
            SearchMode::Address => "address",
            SearchMode::Parcel => "parid",
            SearchMode::Advanced => "advanced",
        }
    }

    /// `search_type` label used in response envelopes.
    pub fn search_type(self) -> &'static str {
        match self {
            SearchMode::Owner => "owner",
            SearchMode::Address => "address",
            SearchMode::Parcel => "parcel_id",
            SearchMode::Advanced => "advanced",
        }
    }
}

/// One row of a portal results table. Columns are mapped positionally and
/// not every row carries every column.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyRecord {
    pub parcel_id: String,
    pub owner_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,
    pub search_timestamp: String,
}

/// Flat key/value extraction of a parcel detail page, plus the named
/// long-text sections. `fields` is flattened into the JSON object, so the
/// serialized shape matches the portal-derived keys directly.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyDetail {
    pub detail_url: String,
    pub scraped_timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl PropertyDetail {
    pub fn new(detail_url: &str) -> Self {
        Self {
            detail_url: detail_url.to_string(),
            scraped_timestamp: Utc::now().to_rfc3339(),
            error: None,
            fields: BTreeMap::new(),
        }
    }

    /// Minimal record for a detail page that could not be fetched. Detail
    /// lookups are often issued per-row in batches, so one failure must not
    /// poison the rest.
    pub fn failed(detail_url: &str, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(detail_url)
        }
    }
}

/// Success envelope for the three search operations. This exact shape is
/// what the per-category caches store.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub search_type: &'static str,
    pub query: String,
    pub results_count: usize,
    pub properties: Vec<PropertyRecord>,
    pub truncated: bool,
    pub timestamp: String,
}

/// Success envelope for `get_property_details`.
#[derive(Debug, Clone, Serialize)]
pub struct DetailResponse {
    pub success: bool,
    pub parcel_id: String,
    pub basic_info: PropertyRecord,
    pub detailed_info: PropertyDetail,
    pub timestamp: String,
}

/// Structured failure envelope. No tool operation raises; every failure is
/// converted into one of these at the boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub error_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parcel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_info: Option<PropertyRecord>,
}

impl ErrorEnvelope {
    fn base(error: String, error_type: &'static str) -> Self {
        Self {
            success: false,
            error,
            error_type,
            status_code: None,
            search_type: None,
            query: None,
            parcel_id: None,
            basic_info: None,
        }
    }

    pub fn http(err: &HttpError) -> Self {
        Self {
            status_code: err.status_code(),
            ..Self::base(err.to_string(), "http_error")
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::base(message.into(), "general_error")
    }

    pub fn not_found(parcel_id: &str) -> Self {
        Self {
            parcel_id: Some(parcel_id.to_string()),
            ..Self::base("Property not found".to_string(), "not_found")
        }
    }

    pub fn no_detail_url(parcel_id: &str, basic_info: PropertyRecord) -> Self {
        Self {
            parcel_id: Some(parcel_id.to_string()),
            basic_info: Some(basic_info),
            ..Self::base("Detail URL not available".to_string(), "no_detail_url")
        }
    }

    pub fn for_search(mut self, mode: SearchMode, query: &str) -> Self {
        self.search_type = Some(mode.search_type());
        self.query = Some(query.to_string());
        self
    }

    pub fn for_parcel(mut self, parcel_id: &str) -> Self {
        self.parcel_id = Some(parcel_id.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchReply {
    Results(SearchResponse),
    Failed(ErrorEnvelope),
}

impl SearchReply {
    pub fn is_failure(&self) -> bool {
        matches!(self, SearchReply::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DetailReply {
    Details(DetailResponse),
    Failed(ErrorEnvelope),
}

impl DetailReply {
    pub fn is_failure(&self) -> bool {
        matches!(self, DetailReply::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub system_available: bool,
    pub status_code: u16,
    pub maintenance_mode: bool,
    pub has_expected_content: bool,
    pub response_time_ms: f64,
    pub check_timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusFailure {
    pub system_available: bool,
    pub error: String,
    pub error_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub check_timestamp: String,
}

impl StatusFailure {
    pub fn http(err: &HttpError) -> Self {
        Self {
            system_available: false,
            error: err.to_string(),
            error_type: "http_error",
            status_code: err.status_code(),
            check_timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            system_available: false,
            error: message.into(),
            error_type: "general_error",
            status_code: None,
            check_timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatusReply {
    Available(SystemStatus),
    Unavailable(StatusFailure),
}

impl StatusReply {
    pub fn is_failure(&self) -> bool {
        matches!(self, StatusReply::Unavailable(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheCleared {
    pub success: bool,
    pub cleared_caches: Vec<&'static str>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheDisabled {
    pub success: bool,
    pub error: String,
    pub cache_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClearCacheReply {
    Cleared(CacheCleared),
    Disabled(CacheDisabled),
}

impl ClearCacheReply {
    pub fn is_failure(&self) -> bool {
        matches!(self, ClearCacheReply::Disabled(_))
    }
}

// Request bodies for the HTTP transport.

#[derive(Debug, Deserialize)]
pub struct OwnerSearchRequest {
    pub owner_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddressSearchRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct ParcelSearchRequest {
    pub parcel_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DetailRequest {
    pub parcel_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ClearCacheRequest {
    #[serde(default)]
    pub cache_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
