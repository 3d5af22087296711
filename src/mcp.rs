use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::ErrorResponse;
use crate::{details, search, system, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpToolsResponse {
    pub tools: Vec<McpTool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpCallResponse {
    pub content: Vec<McpContent>,
    pub is_error: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Serialized tool reply plus whether it carries a failure envelope.
#[derive(Debug)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Missing required parameter: {0}")]
    MissingParam(&'static str),
    #[error("Failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn string_schema(param: &str, description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            param: {
                "type": "string",
                "description": description
            }
        },
        "required": [param]
    })
}

/// The seven tool descriptors, shared by the HTTP and stdio transports.
pub fn tool_definitions() -> Vec<McpTool> {
    vec![
        McpTool {
            name: "search_property_by_owner".to_string(),
            description: "Search New Hanover County property tax records by owner name. Returns matching parcels with owner, address, and tax value.".to_string(),
            input_schema: string_schema("owner_name", "Owner name to search for, e.g. 'SMITH JOHN'"),
        },
        McpTool {
            name: "search_property_by_address".to_string(),
            description: "Search New Hanover County property tax records by street address.".to_string(),
            input_schema: string_schema("address", "Property street address to search for"),
        },
        McpTool {
            name: "search_property_by_parcel_id".to_string(),
            description: "Search New Hanover County property tax records by parcel identification number.".to_string(),
            input_schema: string_schema("parcel_id", "Parcel identification number"),
        },
        McpTool {
            name: "get_property_details".to_string(),
            description: "Get detailed property information for a parcel, including assessment, ownership, and tax fields scraped from the parcel's detail page.".to_string(),
            input_schema: string_schema("parcel_id", "Parcel identification number"),
        },
        McpTool {
            name: "check_system_status".to_string(),
            description: "Check whether the county tax portal is reachable and serving the expected content.".to_string(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        },
        McpTool {
            name: "get_search_capabilities".to_string(),
            description: "Describe the available search types, record fields, and active configuration. No network call.".to_string(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        },
        McpTool {
            name: "clear_cache".to_string(),
            description: "Clear cached search results. Accepts a cache type of all, owner, address, parcel, or detail; defaults to all.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "cache_type": {
                        "type": "string",
                        "description": "Which cache to clear: all, owner, address, parcel, or detail",
                        "enum": ["all", "owner", "address", "parcel", "detail"]
                    }
                }
            }),
        },
    ]
}

fn str_arg<'a>(args: &'a serde_json::Value, name: &'static str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(|value| value.as_str())
        .ok_or(ToolError::MissingParam(name))
}

fn render<T: Serialize>(reply: &T, is_error: bool) -> Result<ToolOutput, ToolError> {
    Ok(ToolOutput {
        text: serde_json::to_string_pretty(reply)?,
        is_error,
    })
}

/// Dispatches one tool invocation. Tool-level failures come back as envelope
/// JSON with `is_error` set; only malformed requests return `Err`.
pub async fn run_tool(
    state: &Arc<AppState>,
    name: &str,
    args: &serde_json::Value,
) -> Result<ToolOutput, ToolError> {
    match name {
        "search_property_by_owner" => {
            let owner_name = str_arg(args, "owner_name")?;
            let reply = search::search_property_by_owner(state, owner_name).await;
            render(&reply, reply.is_failure())
        }
        "search_property_by_address" => {
            let address = str_arg(args, "address")?;
            let reply = search::search_property_by_address(state, address).await;
            render(&reply, reply.is_failure())
        }
        "search_property_by_parcel_id" => {
            let parcel_id = str_arg(args, "parcel_id")?;
            let reply = search::search_property_by_parcel_id(state, parcel_id).await;
            render(&reply, reply.is_failure())
        }
        "get_property_details" => {
            let parcel_id = str_arg(args, "parcel_id")?;
            let reply = details::get_property_details(state, parcel_id).await;
            render(&reply, reply.is_failure())
        }
        "check_system_status" => {
            let reply = system::check_system_status(state).await;
            render(&reply, reply.is_failure())
        }
        "get_search_capabilities" => render(&system::get_search_capabilities(state), false),
        "clear_cache" => {
            let cache_type = args
                .get("cache_type")
                .and_then(|value| value.as_str())
                .unwrap_or("all");
            let reply = system::clear_cache(state, cache_type);
            render(&reply, reply.is_failure())
        }
        _ => Err(ToolError::UnknownTool(name.to_string())),
    }
}

pub async fn list_tools() -> Json<McpToolsResponse> {
    Json(McpToolsResponse {
        tools: tool_definitions(),
    })
}

pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Json(request): Json<McpCallRequest>,
) -> Result<Json<McpCallResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("MCP tool call: {}", request.name);

    match run_tool(&state, &request.name, &request.arguments).await {
        Ok(output) => Ok(Json(McpCallResponse {
            content: vec![McpContent {
                content_type: "text".to_string(),
                text: output.text,
            }],
            is_error: output.is_error,
        })),
        Err(err @ ToolError::Serialize(_)) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )),
        Err(err) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )),
    }
}
