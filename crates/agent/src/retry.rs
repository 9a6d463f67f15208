//! Bounded retry loop around one conversation turn.

use futures::StreamExt;
use mcpchat_config::{BackoffKind, RetryConfig};
use mcpchat_core::Error;
use mcpchat_telemetry::{RequestSnapshot, SessionLogger};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::delta::Delta;
use crate::engine::ConversationEngine;
use crate::turn::{Turn, TurnOutcome, TurnState};

/// Delay before retrying after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * attempt`
    Linear(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(d) => d,
            Self::Linear(base) => base * attempt.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per turn, shared by error and empty-response retries.
    pub max_retries: u32,
    pub error_backoff: Backoff,
    pub empty_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            error_backoff: Backoff::Fixed(Duration::from_secs(3)),
            empty_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        let base = Duration::from_secs(config.error_backoff_secs);
        Self {
            max_retries: config.max_retries.max(1),
            error_backoff: match config.error_backoff {
                BackoffKind::Fixed => Backoff::Fixed(base),
                BackoffKind::Linear => Backoff::Linear(base),
            },
            empty_delay: Duration::from_secs(config.empty_backoff_secs),
        }
    }
}

/// Why an attempt is being retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    Empty,
    Error(String),
}

/// UI hooks called while a turn runs. All methods default to no-ops.
pub trait TurnObserver: Send {
    /// A new attempt is about to stream. `attempt` is 1-based.
    fn attempt_started(&mut self, _attempt: u32, _max: u32) {}

    /// A tool was invoked for the first time in this attempt.
    fn tool_invoked(&mut self, _name: &str, _ordinal: usize) {}

    /// The first non-blank text of the attempt arrived.
    fn response_started(&mut self, _tools_used: &[String]) {}

    /// The attempt failed and another one follows after a delay.
    fn retrying(&mut self, _reason: &RetryReason, _attempt: u32, _max: u32) {}
}

pub struct NoopObserver;

impl TurnObserver for NoopObserver {}

/// Runs turns against the engine and records every step.
pub struct RetryController {
    engine: ConversationEngine,
    logger: Arc<SessionLogger>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(engine: ConversationEngine, logger: Arc<SessionLogger>, policy: RetryPolicy) -> Self {
        Self {
            engine,
            logger,
            policy,
        }
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    pub fn logger(&self) -> &Arc<SessionLogger> {
        &self.logger
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute one turn with up to `max_retries` attempts.
    ///
    /// Every attempt re-sends `user_text` unchanged. Never returns an
    /// error: exhausting the budget yields [`TurnOutcome::Failed`].
    pub async fn run_turn(&self, user_text: &str, observer: &mut dyn TurnObserver) -> TurnOutcome {
        let call_id = self.logger.log_user_query(user_text);
        let mut turn = Turn::new(user_text, call_id);
        let max = self.policy.max_retries;
        let snapshot = self.snapshot();

        loop {
            let attempt = turn.attempt();
            turn.begin_attempt();
            observer.attempt_started(attempt, max);
            debug!(call_id = %turn.call_id, attempt, max, "Starting attempt");

            self.logger
                .log_llm_request(&turn.call_id, &self.engine.config().model, &snapshot, &turn.user_input);

            let reason = match self.stream_attempt(&mut turn, observer).await {
                Ok(()) => {
                    self.logger
                        .log_llm_response(&turn.call_id, &turn.accumulated_text, &turn.tool_calls_made);
                    if turn.finish_stream() == TurnState::Success {
                        info!(
                            call_id = %turn.call_id,
                            attempt,
                            tools = turn.tool_calls_made.len(),
                            "Turn completed"
                        );
                        return TurnOutcome::Success(turn);
                    }
                    self.logger.log_error(
                        &turn.call_id,
                        &Error::EmptyResponse.to_string(),
                        Some(&format!("Attempt {attempt}/{max}")),
                    );
                    RetryReason::Empty
                }
                Err(e) => {
                    let message = e.to_string();
                    turn.fail_attempt(message.clone());
                    self.logger.log_error(
                        &turn.call_id,
                        &message,
                        Some(&format!("Retry attempt {attempt}/{max}")),
                    );
                    RetryReason::Error(message)
                }
            };

            if attempt >= max {
                let (final_message, context) = match &reason {
                    RetryReason::Empty => (
                        "No response received after multiple attempts",
                        format!("Failed after {max} attempts"),
                    ),
                    RetryReason::Error(e) => ("Final retry attempt failed", e.clone()),
                };
                self.logger.log_error(&turn.call_id, final_message, Some(&context));
                warn!(call_id = %turn.call_id, attempts = attempt, "Turn failed");
                turn.mark_failed();
                return TurnOutcome::Failed(turn);
            }

            let delay = match &reason {
                RetryReason::Empty => self.policy.empty_delay,
                RetryReason::Error(_) => self.policy.error_backoff.delay(attempt),
            };
            warn!(call_id = %turn.call_id, attempt, ?reason, ?delay, "Retrying turn");
            observer.retrying(&reason, attempt, max);
            tokio::time::sleep(delay).await;
            turn.schedule_retry();
        }
    }

    async fn stream_attempt(&self, turn: &mut Turn, observer: &mut dyn TurnObserver) -> Result<(), Error> {
        let mut stream = self.engine.send(&turn.user_input);
        let mut started = false;

        while let Some(item) = stream.next().await {
            match item? {
                Delta::Text { fragment } => {
                    if !started && !fragment.trim().is_empty() {
                        started = true;
                        observer.response_started(&turn.tool_calls_made);
                    }
                    turn.push_text(&fragment);
                }
                Delta::ToolInvocation { name, arguments } => {
                    let server = self.engine.server_for(&name);
                    self.logger
                        .log_tool_call(&turn.call_id, &name, &arguments, server.as_deref());
                    if let Some(ordinal) = turn.record_tool(&name) {
                        observer.tool_invoked(&name, ordinal);
                    }
                }
                Delta::ToolResult { name, success, output } => {
                    self.logger
                        .log_tool_response(&turn.call_id.tool_call_id(&name), success, &output);
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> RequestSnapshot {
        let config = self.engine.config();
        RequestSnapshot {
            temperature: config.temperature,
            system_instruction: config.system_instruction.clone(),
            tools_available: !self.engine.tools().is_empty(),
        }
    }
}
