//! The conversation engine: one persistent chat context per session.

use mcpchat_core::error::{Error, GatewayError};
use mcpchat_core::gateway::{ToolDefinition, ToolGateway};
use mcpchat_core::message::{Conversation, Message, MessageToolCall};
use mcpchat_core::provider::{Provider, ProviderRequest, StreamChunk};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::delta::{Delta, DeltaStream};

/// Settings fixed when the chat context is configured.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub system_instruction: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Model rounds allowed per turn; each round after the first answers
    /// the previous round's tool calls.
    pub max_tool_rounds: u32,
}

impl ChatConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            temperature: 0.1,
            max_tokens: None,
            max_tool_rounds: 10,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: Option<u32>) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }
}

struct EngineInner {
    provider: Arc<dyn Provider>,
    gateway: Arc<dyn ToolGateway>,
    config: ChatConfig,
    tools: Vec<ToolDefinition>,
    history: Mutex<Conversation>,
}

/// Owns the chat session against the language model.
///
/// Cheap to clone; clones share the same history.
#[derive(Clone)]
pub struct ConversationEngine {
    inner: Arc<EngineInner>,
}

impl ConversationEngine {
    /// Establish the chat context, listing the gateway's tools once.
    pub async fn configure(
        config: ChatConfig,
        provider: Arc<dyn Provider>,
        gateway: Arc<dyn ToolGateway>,
    ) -> Result<Self, GatewayError> {
        let tools = gateway.list_tools().await?;
        Ok(Self::with_tools(config, provider, gateway, tools))
    }

    /// Establish the chat context with an already listed tool set.
    pub fn with_tools(
        config: ChatConfig,
        provider: Arc<dyn Provider>,
        gateway: Arc<dyn ToolGateway>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        info!(
            provider = provider.name(),
            model = %config.model,
            tools = tools.len(),
            "Chat context configured"
        );
        Self {
            inner: Arc::new(EngineInner {
                provider,
                gateway,
                config,
                tools,
                history: Mutex::new(Conversation::new()),
            }),
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.inner.tools
    }

    pub fn gateway(&self) -> &Arc<dyn ToolGateway> {
        &self.inner.gateway
    }

    /// Server that provides `tool`, when the gateway knows.
    pub fn server_for(&self, tool: &str) -> Option<String> {
        self.inner.gateway.server_for(tool)
    }

    /// Number of committed history messages.
    pub fn history_len(&self) -> usize {
        self.inner.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Issue one user turn.
    ///
    /// The returned stream yields text fragments and tool activity in
    /// generation order. Tool calls are resolved against the gateway before
    /// the next model round. The turn's messages are committed to history
    /// only when it produced non-empty text.
    pub fn send(&self, user_text: &str) -> DeltaStream {
        let (tx, rx) = mpsc::channel(64);
        let inner = self.inner.clone();
        let user_text = user_text.to_string();

        let handle = tokio::spawn(async move {
            if let Err(e) = inner.run_turn(user_text, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        DeltaStream::new(rx, handle.abort_handle())
    }
}

type DeltaSender = mpsc::Sender<Result<Delta, Error>>;

async fn emit(tx: &DeltaSender, delta: Delta) -> Result<(), Error> {
    tx.send(Ok(delta))
        .await
        .map_err(|_| Error::Internal("delta receiver dropped".into()))
}

impl EngineInner {
    async fn run_turn(&self, user_text: String, tx: &DeltaSender) -> Result<(), Error> {
        let history = self
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .messages
            .clone();
        let mut pending = vec![Message::user(user_text)];
        let mut produced_text = false;

        for round in 1..=self.config.max_tool_rounds {
            debug!(round, "Model round");

            let request = ProviderRequest {
                model: self.config.model.clone(),
                system_instruction: self.config.system_instruction.clone(),
                messages: history.iter().chain(pending.iter()).cloned().collect(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
                tools: self.tools.clone(),
            };

            let mut rx = self.provider.stream(request).await?;
            let mut text = String::new();
            let mut calls: Vec<MessageToolCall> = Vec::new();

            while let Some(item) = rx.recv().await {
                match item? {
                    StreamChunk::Text { text: fragment } => {
                        text.push_str(&fragment);
                        emit(tx, Delta::Text { fragment }).await?;
                    }
                    StreamChunk::ToolCall { call } => {
                        emit(
                            tx,
                            Delta::ToolInvocation {
                                name: call.name.clone(),
                                arguments: call.arguments_value(),
                            },
                        )
                        .await?;
                        calls.push(call);
                    }
                    StreamChunk::Empty => {}
                    StreamChunk::Done { usage } => {
                        if let Some(u) = usage {
                            debug!(round, total_tokens = u.total_tokens, "Round usage");
                        }
                        break;
                    }
                }
            }

            produced_text |= !text.trim().is_empty();
            let capped = !calls.is_empty() && round == self.config.max_tool_rounds;
            if capped {
                warn!(rounds = round, dropped = calls.len(), "Max tool rounds reached, ending turn");
                // Calls that will never be answered stay out of history.
                calls.clear();
            }

            if !text.is_empty() || !calls.is_empty() {
                let mut reply = Message::assistant(text);
                reply.tool_calls = calls.clone();
                pending.push(reply);
            }
            if calls.is_empty() {
                break;
            }

            for call in &calls {
                let (output, success) = self.invoke(call).await?;
                emit(
                    tx,
                    Delta::ToolResult {
                        name: call.name.clone(),
                        success,
                        output: output.clone(),
                    },
                )
                .await?;
                pending.push(Message::tool_result(call, output));
            }
        }

        if produced_text {
            self.history
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend(pending);
        }
        Ok(())
    }

    /// Run one tool call. Errors the model can recover from are returned to
    /// it as a failed result; transport failures end the turn.
    async fn invoke(&self, call: &MessageToolCall) -> Result<(String, bool), Error> {
        match self.gateway.call_tool(&call.name, call.arguments_value()).await {
            Ok(out) => Ok((out.content, !out.is_error)),
            Err(e @ (GatewayError::Rpc { .. } | GatewayError::ToolNotFound(_))) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                Ok((format!("Error: {e}"), false))
            }
            Err(e) => Err(e.into()),
        }
    }
}
