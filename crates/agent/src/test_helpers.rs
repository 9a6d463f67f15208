//! Shared test helpers: a scripted provider and an in-memory tool gateway.

use mcpchat_core::error::{GatewayError, ProviderError};
use mcpchat_core::gateway::{ToolDefinition, ToolGateway, ToolOutput};
use mcpchat_core::message::MessageToolCall;
use mcpchat_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use std::collections::HashMap;
use std::sync::Mutex;

/// What one `stream()` call produces.
pub enum Script {
    /// Stream these chunks, then finish normally.
    Chunks(Vec<StreamChunk>),
    /// Reject the request before streaming.
    Reject(ProviderError),
    /// Stream these chunks, then break with an error.
    Break(Vec<StreamChunk>, ProviderError),
}

/// A mock provider that plays back scripted streams in sequence.
///
/// Panics if more calls are made than scripts provided.
pub struct SequentialMockProvider {
    scripts: Mutex<Vec<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(mut scripts: Vec<Script>) -> Self {
        scripts.reverse();
        Self {
            scripts: Mutex::new(scripts),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| panic!("SequentialMockProvider: no script for call #{count}"));

        let (chunks, tail) = match script {
            Script::Chunks(chunks) => (chunks, Ok(StreamChunk::Done { usage: None })),
            Script::Reject(e) => return Err(e),
            Script::Break(chunks, e) => (chunks, Err(e)),
        };

        let (tx, rx) = tokio::sync::mpsc::channel(chunks.len() + 1);
        for chunk in chunks {
            tx.try_send(Ok(chunk)).unwrap();
        }
        tx.try_send(tail).unwrap();
        Ok(rx)
    }
}

pub fn text(t: &str) -> StreamChunk {
    StreamChunk::text(t)
}

pub fn call(name: &str, args: serde_json::Value) -> StreamChunk {
    StreamChunk::tool_call(MessageToolCall {
        id: format!("call_{name}"),
        name: name.into(),
        arguments: args.to_string(),
    })
}

/// A gateway with canned tool results.
#[derive(Default)]
pub struct MockGateway {
    tools: Vec<ToolDefinition>,
    results: HashMap<String, Result<ToolOutput, GatewayError>>,
    calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str, result: Result<&str, GatewayError>) -> Self {
        self.tools.push(ToolDefinition {
            name: name.into(),
            description: format!("{name} tool"),
            parameters: serde_json::json!({"type": "object"}),
            server: Some("mock".into()),
        });
        self.results.insert(
            name.into(),
            result.map(|content| ToolOutput {
                content: content.into(),
                is_error: false,
                server: Some("mock".into()),
            }),
        );
        self
    }

    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ToolGateway for MockGateway {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, GatewayError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<ToolOutput, GatewayError> {
        self.calls.lock().unwrap().push((name.to_string(), arguments));
        self.results
            .get(name)
            .cloned()
            .unwrap_or_else(|| Err(GatewayError::ToolNotFound(name.to_string())))
    }

    fn server_for(&self, tool: &str) -> Option<String> {
        self.results.contains_key(tool).then(|| "mock".to_string())
    }
}
