use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::env;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use nhc_tax_mcp::config::Settings;
use nhc_tax_mcp::{details, mcp, search, system, types::*, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env();
    settings.ensure_data_dir();

    info!("Starting property tax search server");
    info!("Portal base URL: {}", settings.base_url);

    let state = Arc::new(AppState::new(settings));

    // Build router
    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/search/owner", post(search_owner_handler))
        .route("/search/address", post(search_address_handler))
        .route("/search/parcel", post(search_parcel_handler))
        .route("/details", post(details_handler))
        .route("/status", get(status_handler))
        .route("/capabilities", get(capabilities_handler))
        .route("/cache/clear", post(clear_cache_handler))
        .route("/mcp/tools", get(mcp::list_tools))
        .route("/mcp/call", post(mcp::call_tool))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(8000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Property tax server listening on http://0.0.0.0:{port}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Rejects requests without the configured `x-api-key` header. A no-op when
/// no key is configured.
async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.settings.api_key {
        let provided = request
            .headers()
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "nhc-tax-mcp",
        "version": "0.1.0"
    }))
}

async fn search_owner_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OwnerSearchRequest>,
) -> Json<SearchReply> {
    Json(search::search_property_by_owner(&state, &request.owner_name).await)
}

async fn search_address_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddressSearchRequest>,
) -> Json<SearchReply> {
    Json(search::search_property_by_address(&state, &request.address).await)
}

async fn search_parcel_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ParcelSearchRequest>,
) -> Json<SearchReply> {
    Json(search::search_property_by_parcel_id(&state, &request.parcel_id).await)
}

async fn details_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DetailRequest>,
) -> Json<DetailReply> {
    Json(details::get_property_details(&state, &request.parcel_id).await)
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusReply> {
    Json(system::check_system_status(&state).await)
}

async fn capabilities_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(system::get_search_capabilities(&state))
}

async fn clear_cache_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClearCacheRequest>,
) -> Json<ClearCacheReply> {
    let cache_type = request.cache_type.as_deref().unwrap_or("all");
    Json(system::clear_cache(&state, cache_type))
}
