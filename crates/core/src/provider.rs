//! Provider trait: the abstraction over the hosted chat transport.
//!
//! A Provider sends the conversation so far to a language model and returns
//! a finite stream of [`StreamChunk`]s. Every wire-level chunk shape is
//! normalized into exactly one tagged variant at the transport boundary, so
//! the conversation engine never probes raw response structures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::gateway::ToolDefinition;
use crate::message::{Message, MessageToolCall};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gemini-2.5-flash")
    pub model: String,

    /// System instruction for the chat context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.1
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One normalized unit of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Incremental text of the model's reply.
    Text { text: String },

    /// The model asked for a tool to be invoked.
    ToolCall { call: MessageToolCall },

    /// A chunk that carried nothing the engine cares about.
    Empty,

    /// The stream finished normally.
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_call(call: MessageToolCall) -> Self {
        Self::ToolCall { call }
    }
}

/// Receiving half of a provider stream.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// The conversation engine calls `stream()` without knowing which backend
/// is behind it. Errors may be returned up front (request rejected) or as
/// an `Err` item mid-stream (transport broke).
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini").
    fn name(&self) -> &str;

    /// Send a request and get a stream of normalized chunks.
    async fn stream(&self, request: ProviderRequest) -> std::result::Result<ChunkReceiver, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults() {
        let req: ProviderRequest = serde_json::from_value(serde_json::json!({
            "model": "gemini-2.5-flash",
            "messages": []
        }))
        .unwrap();
        assert!((req.temperature - 0.1).abs() < f32::EPSILON);
        assert!(req.tools.is_empty());
        assert!(req.system_instruction.is_none());
    }

    #[test]
    fn stream_chunk_is_tagged() {
        let json = serde_json::to_string(&StreamChunk::text("hi")).unwrap();
        assert!(json.contains(r#""type":"text""#));

        let json = serde_json::to_string(&StreamChunk::Empty).unwrap();
        assert_eq!(json, r#"{"type":"empty"}"#);
    }
}
