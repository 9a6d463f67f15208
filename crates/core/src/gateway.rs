//! ToolGateway trait: the connection to tool-providing services.
//!
//! The gateway is opened once at startup and shared by the whole session.
//! The conversation engine lists its tools when the chat context is
//! configured and resolves the model's tool calls against it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,

    /// The server that provides this tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl ToolDefinition {
    /// Category used when reporting loaded tools: the prefix before the
    /// first `_`, title-cased, or `General`.
    pub fn category(&self) -> String {
        match self.name.split_once('_') {
            Some((prefix, _)) if !prefix.is_empty() => title_case(prefix),
            _ => "General".to_string(),
        }
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// The result of invoking a tool through the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text content returned by the tool
    pub content: String,

    /// The tool reported a failure in-band
    #[serde(default)]
    pub is_error: bool,

    /// The server that executed the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

/// The tool gateway seam.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// List every tool the connected services expose.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, GatewayError>;

    /// Invoke a tool by name.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, GatewayError>;

    /// Name of the server that provides `tool`, if known.
    fn server_for(&self, _tool: &str) -> Option<String> {
        None
    }

    /// Close every underlying connection. Best effort.
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object"}),
            server: None,
        }
    }

    #[test]
    fn category_uses_prefix() {
        assert_eq!(def("slack_send_message").category(), "Slack");
        assert_eq!(def("GITHUB_create_issue").category(), "Github");
    }

    #[test]
    fn category_defaults_to_general() {
        assert_eq!(def("search").category(), "General");
        assert_eq!(def("_private").category(), "General");
    }

    #[test]
    fn tool_definition_serialization() {
        let json = serde_json::to_string(&def("price_lookup")).unwrap();
        assert!(json.contains("price_lookup"));
        assert!(!json.contains("server"));
    }
}
