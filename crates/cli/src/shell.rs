//! The interactive loop.

use futures::{Stream, StreamExt};
use mcpchat_agent::{RetryController, RetryReason, TurnObserver, TurnOutcome};
use mcpchat_config::IndicatorConfig;
use mcpchat_core::ToolGateway;
use mcpchat_telemetry::LogSummary;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::display;
use crate::indicator::ProgressIndicator;

const EXIT_COMMANDS: [&str; 4] = ["exit", "quit", "bye", "goodbye"];

/// Whether `input` asks to end the session. Case-insensitive, surrounding
/// whitespace ignored.
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    EXIT_COMMANDS.iter().any(|cmd| cmd.eq_ignore_ascii_case(input))
}

/// Why the shell stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellExit {
    Command,
    EndOfInput,
    Interrupted,
}

/// Reads lines, runs one turn per line and renders the outcome.
pub struct InteractionShell {
    controller: RetryController,
    gateway: Arc<dyn ToolGateway>,
    indicator: Option<IndicatorConfig>,
}

impl InteractionShell {
    pub fn new(controller: RetryController, gateway: Arc<dyn ToolGateway>, indicator: IndicatorConfig) -> Self {
        Self {
            controller,
            gateway,
            indicator: Some(indicator),
        }
    }

    /// Run turns without drawing the progress spinner.
    pub fn without_indicator(mut self) -> Self {
        self.indicator = None;
        self
    }

    pub fn controller(&self) -> &RetryController {
        &self.controller
    }

    /// Run until an exit command, end of input or `interrupt` completes.
    ///
    /// One turn is in flight at a time. Every exit path goes through
    /// [`shutdown`](Self::shutdown) exactly once.
    pub async fn run<S, I>(&self, mut input: S, interrupt: I) -> ShellExit
    where
        S: Stream<Item = std::io::Result<String>> + Unpin,
        I: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let exit = loop {
            display::prompt();
            let line = tokio::select! {
                _ = &mut interrupt => break ShellExit::Interrupted,
                line = input.next() => line,
            };

            let line = match line {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!(error = %e, "Failed to read input");
                    break ShellExit::EndOfInput;
                }
                None => break ShellExit::EndOfInput,
            };

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if is_exit_command(text) {
                break ShellExit::Command;
            }

            tokio::select! {
                _ = &mut interrupt => break ShellExit::Interrupted,
                outcome = self.turn(text) => render(&outcome),
            }
        };

        info!(?exit, "Shell exiting");
        self.shutdown().await;
        exit
    }

    async fn turn(&self, text: &str) -> TurnOutcome {
        let mut observer = ShellObserver {
            config: self.indicator.clone(),
            spinner: None,
        };
        self.controller.run_turn(text, &mut observer).await
    }

    /// End the log session, close the gateway and say goodbye.
    pub async fn shutdown(&self) -> LogSummary {
        let summary = self.controller.logger().end_session();
        self.gateway.close().await;
        display::goodbye(&summary);
        summary
    }
}

fn render(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Success(turn) => display::assistant_reply(turn),
        TurnOutcome::Failed(turn) => display::turn_failed(turn),
    }
}

/// Drives the spinner and progress lines for one turn. Dropping it stops
/// the spinner.
struct ShellObserver {
    config: Option<IndicatorConfig>,
    spinner: Option<ProgressIndicator>,
}

impl ShellObserver {
    fn stop_spinner(&mut self) {
        if let Some(mut spinner) = self.spinner.take() {
            spinner.stop();
        }
    }
}

impl TurnObserver for ShellObserver {
    fn attempt_started(&mut self, _attempt: u32, _max: u32) {
        self.stop_spinner();
        self.spinner = self.config.as_ref().map(ProgressIndicator::start);
    }

    fn tool_invoked(&mut self, name: &str, ordinal: usize) {
        self.stop_spinner();
        display::tool_call(ordinal, name);
    }

    fn response_started(&mut self, tools_used: &[String]) {
        self.stop_spinner();
        display::response_started(tools_used);
    }

    fn retrying(&mut self, reason: &RetryReason, attempt: u32, max: u32) {
        self.stop_spinner();
        display::retrying(reason, attempt, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_vocabulary() {
        for word in ["exit", "QUIT", " Bye ", "GoodBye\n"] {
            assert!(is_exit_command(word), "{word:?} should exit");
        }
        for word in ["", "exit now", "bye!", "leave"] {
            assert!(!is_exit_command(word), "{word:?} should not exit");
        }
    }
}
