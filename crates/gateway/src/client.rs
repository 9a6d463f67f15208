//! A client for one MCP server over rmcp's streamable-HTTP transport.

use mcpchat_config::McpServerConfig;
use mcpchat_core::{GatewayError, ToolDefinition, ToolOutput};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::ServiceExt;
use rmcp::model::{CallToolRequestParam, CallToolResult, ClientInfo, Tool};
use rmcp::service::{Peer, RoleClient, RunningService, ServiceError};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC "invalid params".
const INVALID_PARAMS: i64 = -32602;

/// A live session with a single MCP server.
pub struct McpClient {
    name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ClientInfo>>>,
}

impl McpClient {
    /// Connect and run the MCP `initialize` handshake.
    pub async fn connect(config: &McpServerConfig) -> Result<Self, GatewayError> {
        let unreachable = |reason: String| GatewayError::Connection {
            server: config.name.clone(),
            reason,
        };

        let http = reqwest::Client::builder()
            .default_headers(build_headers(config)?)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| unreachable(e.to_string()))?;

        let mut transport_config = StreamableHttpClientTransportConfig::with_uri(config.url.as_str());
        if let Some(token) = &config.bearer_token {
            transport_config = transport_config.auth_header(token.clone());
        }
        let transport = StreamableHttpClientTransport::with_client(http, transport_config);

        let service = client_info()
            .serve(transport)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        info!(server = %config.name, url = %config.url, "Connected to MCP server");
        Ok(Self {
            name: config.name.clone(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        })
    }

    /// Configured server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every tool the server exposes, across all pages.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, GatewayError> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|e| self.service_error(e))?;
        debug!(server = %self.name, count = tools.len(), "Listed tools");
        Ok(tools.into_iter().map(|t| self.definition(t)).collect())
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, GatewayError> {
        let arguments = match arguments {
            Value::Null => None,
            Value::Object(map) => Some(map),
            other => {
                return Err(self.invalid_params(format!(
                    "tool arguments must be a JSON object, got {other}"
                )));
            }
        };
        let params: CallToolRequestParam =
            serde_json::from_value(serde_json::json!({ "name": name, "arguments": arguments }))
                .map_err(|e| self.invalid_params(e.to_string()))?;

        let result = self
            .peer
            .call_tool(params)
            .await
            .map_err(|e| self.service_error(e))?;

        let (content, is_error) = render_result(&result);
        Ok(ToolOutput {
            content,
            is_error,
            server: Some(self.name.clone()),
        })
    }

    /// End the session. The transport deletes the server-side session on
    /// the way out. Later calls are no-ops.
    pub async fn close(&self) {
        let Some(service) = self.service.lock().await.take() else {
            return;
        };
        match service.cancel().await {
            Ok(reason) => debug!(server = %self.name, ?reason, "Closed MCP session"),
            Err(e) => warn!(server = %self.name, error = %e, "Failed to close MCP session"),
        }
    }

    fn definition(&self, tool: Tool) -> ToolDefinition {
        ToolDefinition {
            name: tool.name.into_owned(),
            description: tool.description.map(|d| d.into_owned()).unwrap_or_default(),
            parameters: Value::Object(tool.input_schema.as_ref().clone()),
            server: Some(self.name.clone()),
        }
    }

    fn service_error(&self, error: ServiceError) -> GatewayError {
        match error {
            ServiceError::McpError(e) => GatewayError::Rpc {
                server: self.name.clone(),
                code: i64::from(e.code.0),
                message: e.message.into_owned(),
            },
            other => GatewayError::Transport {
                server: self.name.clone(),
                reason: other.to_string(),
            },
        }
    }

    fn invalid_params(&self, message: String) -> GatewayError {
        GatewayError::Rpc {
            server: self.name.clone(),
            code: INVALID_PARAMS,
            message,
        }
    }
}

fn client_info() -> ClientInfo {
    let mut info = ClientInfo::default();
    info.client_info.name = "mcpchat".into();
    info.client_info.version = env!("CARGO_PKG_VERSION").into();
    info
}

/// Extra headers sent with every request to the server.
fn build_headers(config: &McpServerConfig) -> Result<HeaderMap, GatewayError> {
    let invalid = |what: &str| GatewayError::Connection {
        server: config.name.clone(),
        reason: format!("invalid header {what}"),
    };

    let mut headers = HeaderMap::new();
    for (key, value) in &config.headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| invalid(key))?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid(key))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Flatten a tool result into the text handed back to the model, plus its
/// error flag.
fn render_result(result: &CallToolResult) -> (String, bool) {
    let value = serde_json::to_value(result).unwrap_or(Value::Null);
    let is_error = value["isError"].as_bool().unwrap_or(false);

    let parts: Vec<String> = value["content"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(render_block)
        .collect();

    if parts.is_empty() {
        let structured = value
            .get("structuredContent")
            .filter(|v| !v.is_null())
            .map(Value::to_string)
            .unwrap_or_default();
        return (structured, is_error);
    }
    (parts.join("\n"), is_error)
}

fn render_block(block: &Value) -> Option<String> {
    let mime = || block["mimeType"].as_str().unwrap_or("unknown").to_string();
    match block["type"].as_str()? {
        "text" => block["text"].as_str().map(String::from),
        "image" => Some(format!("[image: {}]", mime())),
        "audio" => Some(format!("[audio: {}]", mime())),
        "resource" => {
            let resource = &block["resource"];
            Some(
                resource["text"]
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| resource.to_string()),
            )
        }
        "resource_link" => block["uri"].as_str().map(|uri| format!("[resource: {uri}]")),
        _ => None,
    }
}
