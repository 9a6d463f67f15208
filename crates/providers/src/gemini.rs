//! Google Gemini provider (Generative Language REST API).
//!
//! Supports:
//! - Streaming chat via `models/{model}:streamGenerateContent?alt=sse`
//! - Function declarations built from MCP tool schemas
//! - Function call / function response turns in the history
//!
//! Every SSE event is decoded into [`StreamChunk`] variants here, so the
//! conversation engine only ever sees text, tool calls, empty chunks and
//! the final `Done`.

use async_trait::async_trait;
use futures::StreamExt;
use mcpchat_core::error::ProviderError;
use mcpchat_core::message::{Message, MessageToolCall, Role};
use mcpchat_core::provider::*;
use mcpchat_core::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

/// JSON Schema keywords the function declaration schema does not accept.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &[
    "$schema",
    "$id",
    "$ref",
    "$defs",
    "$comment",
    "definitions",
    "additionalProperties",
    "examples",
    "default",
    "const",
];

/// A Gemini chat provider.
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: "gemini".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    /// Build the `generateContent` request body.
    fn request_body(request: &ProviderRequest) -> Value {
        let mut body = serde_json::json!({
            "contents": Self::to_api_contents(&request.messages),
            "generationConfig": { "temperature": request.temperature },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["generationConfig"]["maxOutputTokens"] = serde_json::json!(max_tokens);
        }

        if let Some(instruction) = request.system_instruction.as_deref() {
            if !instruction.is_empty() {
                body["systemInstruction"] = serde_json::json!({
                    "parts": [{ "text": instruction }]
                });
            }
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!([{
                "functionDeclarations": Self::to_function_declarations(&request.tools)
            }]);
        }

        body
    }

    /// Convert messages to Gemini contents. Consecutive tool results are
    /// grouped into one `user` turn of function responses.
    fn to_api_contents(messages: &[Message]) -> Vec<ApiContent> {
        let mut contents: Vec<ApiContent> = Vec::new();

        for m in messages {
            match m.role {
                Role::User => contents.push(ApiContent {
                    role: "user".into(),
                    parts: vec![ApiPart::text(&m.content)],
                }),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !m.content.is_empty() {
                        parts.push(ApiPart::text(&m.content));
                    }
                    parts.extend(m.tool_calls.iter().map(|tc| ApiPart {
                        function_call: Some(ApiFunctionCall {
                            id: None,
                            name: tc.name.clone(),
                            args: tc.arguments_value(),
                        }),
                        ..ApiPart::default()
                    }));
                    if !parts.is_empty() {
                        contents.push(ApiContent {
                            role: "model".into(),
                            parts,
                        });
                    }
                }
                Role::Tool => {
                    let part = ApiPart {
                        function_response: Some(ApiFunctionResponse {
                            name: m.tool_name.clone().unwrap_or_default(),
                            response: serde_json::json!({ "content": m.content }),
                        }),
                        ..ApiPart::default()
                    };
                    match contents.last_mut() {
                        Some(last)
                            if last.role == "user"
                                && last.parts.iter().all(|p| p.function_response.is_some()) =>
                        {
                            last.parts.push(part)
                        }
                        _ => contents.push(ApiContent {
                            role: "user".into(),
                            parts: vec![part],
                        }),
                    }
                }
            }
        }

        contents
    }

    fn to_function_declarations(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                let mut decl = serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                });
                let params = sanitize_schema(&t.parameters);
                let has_properties = params
                    .get("properties")
                    .and_then(Value::as_object)
                    .is_some_and(|p| !p.is_empty());
                // An OBJECT schema without properties is rejected; omit it.
                if has_properties {
                    decl["parameters"] = params;
                }
                decl
            })
            .collect()
    }
}

/// Strip JSON Schema keywords Gemini rejects, recursively.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&k.as_str()))
                .map(|(k, v)| {
                    // Property names are user data, not keywords.
                    let v = if k == "properties" {
                        match v {
                            Value::Object(props) => Value::Object(
                                props
                                    .iter()
                                    .map(|(name, s)| (name.clone(), sanitize_schema(s)))
                                    .collect(),
                            ),
                            other => other.clone(),
                        }
                    } else {
                        sanitize_schema(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

/// Result of decoding one SSE `data:` payload.
#[derive(Debug, Default, PartialEq)]
pub struct DecodedEvent {
    pub chunks: Vec<StreamChunk>,
    pub usage: Option<Usage>,
}

/// Decode one SSE payload into normalized chunks.
///
/// Thought parts are dropped. An event that carries neither text nor a
/// function call decodes to a single [`StreamChunk::Empty`].
pub fn decode_event(data: &str) -> std::result::Result<DecodedEvent, ProviderError> {
    let event: StreamResponse =
        serde_json::from_str(data).map_err(|e| ProviderError::Decode(e.to_string()))?;

    if let Some(err) = event.error {
        return Err(ProviderError::ApiError {
            status_code: err.code.unwrap_or(500),
            message: err.message.unwrap_or_else(|| "unknown error".into()),
        });
    }

    let mut chunks = Vec::new();
    for candidate in event.candidates {
        let Some(content) = candidate.content else {
            continue;
        };
        for part in content.parts {
            if part.thought.unwrap_or(false) {
                continue;
            }
            if let Some(call) = part.function_call {
                let id = call
                    .id
                    .unwrap_or_else(|| format!("call_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]));
                chunks.push(StreamChunk::tool_call(MessageToolCall {
                    id,
                    name: call.name,
                    arguments: call.args.to_string(),
                }));
            } else if let Some(text) = part.text {
                if !text.is_empty() {
                    chunks.push(StreamChunk::text(text));
                }
            }
        }
    }

    if chunks.is_empty() {
        chunks.push(StreamChunk::Empty);
    }

    let usage = event.usage_metadata.map(|u| Usage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
    });

    Ok(DecodedEvent { chunks, usage })
}

/// Splits an SSE byte stream into `data:` payloads.
///
/// Lines are cut on raw `\n` bytes before decoding, so a UTF-8 character
/// split across network chunks is reassembled intact.
#[derive(Debug, Default)]
pub struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every complete `data:` payload.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(data) = Self::data_of(&line[..line_end]) {
                out.push(data);
            }
        }
        out
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        Self::data_of(&line)
    }

    fn data_of(line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches('\r');
        // Skip empty lines and SSE comments
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() || data == "[DONE]" {
            return None;
        }
        Some(data.to_string())
    }
}

/// Decode one payload and send its chunks. Returns `false` once the stream
/// must stop (receiver gone or the service reported an error).
async fn forward(
    tx: &tokio::sync::mpsc::Sender<std::result::Result<StreamChunk, ProviderError>>,
    provider_name: &str,
    data: String,
    usage: &mut Option<Usage>,
) -> bool {
    match decode_event(&data) {
        Ok(event) => {
            if event.usage.is_some() {
                *usage = event.usage;
            }
            for chunk in event.chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return false; // receiver dropped
                }
            }
            true
        }
        Err(ProviderError::Decode(e)) => {
            trace!(provider = %provider_name, data = %data, error = %e, "Ignoring undecodable SSE event");
            true
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

#[async_trait]
impl mcpchat_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = self.stream_url(&request.model);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            return Err(ProviderError::ModelNotFound(request.model));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and decode events
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLines::new();
            let mut usage = None;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for data in lines.push(&bytes) {
                    if !forward(&tx, &provider_name, data, &mut usage).await {
                        return;
                    }
                }
            }

            if let Some(data) = lines.finish() {
                if !forward(&tx, &provider_name, data, &mut usage).await {
                    return;
                }
            }

            let _ = tx.send(Ok(StreamChunk::Done { usage })).await;
        });

        Ok(rx)
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiContent {
    role: String,
    parts: Vec<ApiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<ApiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<ApiFunctionResponse>,
}

impl ApiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionResponse {
    name: String,
    response: Value,
}

// --- Streaming SSE types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<StreamCandidate>,
    #[serde(default)]
    usage_metadata: Option<ApiUsage>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct StreamCandidate {
    #[serde(default)]
    content: Option<StreamContent>,
}

#[derive(Debug, Deserialize)]
struct StreamContent {
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}
