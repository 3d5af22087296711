use rmcp::{model::*, ServiceExt};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Settings;
use crate::mcp::{self, ToolError};
use crate::AppState;

#[derive(Clone, Debug)]
pub struct McpService {
    pub state: Arc<AppState>,
}

impl McpService {
    pub fn new() -> anyhow::Result<Self> {
        // Log to stderr; stdout carries the MCP protocol stream.
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();

        let settings = Settings::from_env();
        settings.ensure_data_dir();

        info!("Starting property tax MCP service");
        info!("Portal base URL: {}", settings.base_url);

        Ok(Self {
            state: Arc::new(AppState::new(settings)),
        })
    }
}

impl rmcp::ServerHandler for McpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            server_info: Implementation {
                name: "nhc-tax-mcp".to_string(),
                version: "0.1.0".to_string(),
            },
            instructions: Some(
                "Search New Hanover County property tax records by owner name, street address, or parcel id, and fetch per-parcel detail pages. Responses are cached and requests to the county portal are rate limited.".to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _page: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = mcp::tool_definitions()
            .into_iter()
            .map(|tool| Tool {
                name: Cow::Owned(tool.name),
                description: Some(Cow::Owned(tool.description)),
                input_schema: match tool.input_schema {
                    serde_json::Value::Object(map) => Arc::new(map),
                    _ => Arc::new(serde_json::Map::new()),
                },
                output_schema: None,
                annotations: None,
            })
            .collect();

        Ok(ListToolsResult {
            tools,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        info!("MCP tool call: {}", request.name);

        let arguments = match &request.arguments {
            Some(map) => serde_json::Value::Object(map.clone()),
            None => serde_json::Value::Null,
        };

        match mcp::run_tool(&self.state, request.name.as_ref(), &arguments).await {
            Ok(output) => Ok(CallToolResult::success(vec![Content::text(output.text)])),
            Err(ToolError::UnknownTool(name)) => Err(ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Unknown tool: {name}"),
                None,
            )),
            Err(err @ ToolError::MissingParam(_)) => Err(ErrorData::new(
                ErrorCode::INVALID_PARAMS,
                err.to_string(),
                None,
            )),
            Err(err) => {
                error!("Tool call failed: {err}");
                Err(ErrorData::new(
                    ErrorCode::INTERNAL_ERROR,
                    err.to_string(),
                    None,
                ))
            }
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let service = McpService::new()?;
    // Use the stdio transport from rmcp
    let server = service.serve(rmcp::transport::stdio()).await?;
    info!("MCP stdio server running");
    let _quit_reason = server.waiting().await?;
    Ok(())
}
