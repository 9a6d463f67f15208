//! MCP tool gateway for mcpchat.
//!
//! Connects to every configured MCP server through rmcp's streamable-HTTP
//! client and exposes them as a single [`ToolGateway`]: tools from all
//! servers are listed together and each call is routed to the server that
//! advertised the tool.
//!
//! The gateway is opened once at startup and closed once at shutdown.

pub mod client;
#[cfg(test)]
mod testing;

pub use client::McpClient;

use async_trait::async_trait;
use mcpchat_config::McpServerConfig;
use mcpchat_core::{GatewayError, ToolDefinition, ToolGateway, ToolOutput};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{info, warn};

/// Aggregated gateway over one or more MCP servers.
pub struct McpGateway {
    clients: Vec<McpClient>,
    /// Tool name → index into `clients`. Filled by `list_tools`.
    routes: RwLock<HashMap<String, usize>>,
}

impl McpGateway {
    /// Connect to every configured server.
    ///
    /// A required server that cannot be reached fails the whole connect.
    /// Optional servers that fail are dropped and returned alongside the
    /// gateway so the caller can warn about reduced functionality.
    pub async fn connect(
        servers: &[McpServerConfig],
    ) -> Result<(Self, Vec<(String, GatewayError)>), GatewayError> {
        if servers.is_empty() {
            return Err(GatewayError::NoServers);
        }

        let mut clients = Vec::with_capacity(servers.len());
        let mut dropped = Vec::new();

        for server in servers {
            match McpClient::connect(server).await {
                Ok(client) => clients.push(client),
                Err(e) if !server.required => {
                    warn!(server = %server.name, error = %e, "Optional MCP server unavailable, continuing without it");
                    dropped.push((server.name.clone(), e));
                }
                Err(e) => {
                    for client in &clients {
                        client.close().await;
                    }
                    return Err(e);
                }
            }
        }

        if clients.is_empty() {
            return Err(dropped
                .into_iter()
                .next()
                .map(|(_, e)| e)
                .unwrap_or(GatewayError::NoServers));
        }

        info!(connected = clients.len(), dropped = dropped.len(), "MCP gateway ready");
        Ok((
            Self {
                clients,
                routes: RwLock::new(HashMap::new()),
            },
            dropped,
        ))
    }

    /// Names of the servers that are connected.
    pub fn server_names(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.name().to_string()).collect()
    }

    fn route(&self, tool: &str) -> Option<usize> {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(tool)
            .copied()
    }
}

#[async_trait]
impl ToolGateway for McpGateway {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, GatewayError> {
        let mut all = Vec::new();
        let mut routes = HashMap::new();

        for (idx, client) in self.clients.iter().enumerate() {
            for tool in client.list_tools().await? {
                if routes.contains_key(&tool.name) {
                    warn!(tool = %tool.name, server = %client.name(), "Duplicate tool name, keeping the first server's");
                    continue;
                }
                routes.insert(tool.name.clone(), idx);
                all.push(tool);
            }
        }

        *self.routes.write().unwrap_or_else(|e| e.into_inner()) = routes;
        Ok(all)
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<ToolOutput, GatewayError> {
        let idx = match self.route(name) {
            Some(idx) => idx,
            // Single server: let it answer for tools we have not listed.
            None if self.clients.len() == 1 => 0,
            None => return Err(GatewayError::ToolNotFound(name.to_string())),
        };
        self.clients[idx].call_tool(name, arguments).await
    }

    fn server_for(&self, tool: &str) -> Option<String> {
        self.route(tool).map(|idx| self.clients[idx].name().to_string())
    }

    async fn close(&self) {
        for client in &self.clients {
            client.close().await;
        }
    }
}
