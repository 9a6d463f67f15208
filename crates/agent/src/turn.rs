//! Per-turn state: one user message and its reply, across retries.

use mcpchat_telemetry::CallId;

/// Where a turn is in its retry state machine.
///
/// `Pending` is the only state a retry re-enters. `Success` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Pending,
    Streaming,
    Success,
    Empty,
    Error,
    Failed,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// One logical turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub user_input: String,
    pub call_id: CallId,
    /// Retries scheduled so far; the attempt in flight is `retry_count + 1`.
    pub retry_count: u32,
    /// Distinct tool names seen during the current attempt, first
    /// occurrence order.
    pub tool_calls_made: Vec<String>,
    pub accumulated_text: String,
    pub state: TurnState,
    pub last_error: Option<String>,
}

impl Turn {
    pub fn new(user_input: impl Into<String>, call_id: CallId) -> Self {
        Self {
            user_input: user_input.into(),
            call_id,
            retry_count: 0,
            tool_calls_made: Vec::new(),
            accumulated_text: String::new(),
            state: TurnState::Pending,
            last_error: None,
        }
    }

    /// 1-based number of the attempt in flight.
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }

    /// PENDING → STREAMING. Partial output and the error of an earlier
    /// attempt are discarded.
    pub fn begin_attempt(&mut self) {
        debug_assert_eq!(self.state, TurnState::Pending);
        self.tool_calls_made.clear();
        self.accumulated_text.clear();
        self.last_error = None;
        self.state = TurnState::Streaming;
    }

    /// Record a tool invocation. Returns its 1-based ordinal the first time
    /// a name is seen in this attempt, `None` for repeats.
    pub fn record_tool(&mut self, name: &str) -> Option<usize> {
        if self.tool_calls_made.iter().any(|t| t == name) {
            return None;
        }
        self.tool_calls_made.push(name.to_string());
        Some(self.tool_calls_made.len())
    }

    pub fn push_text(&mut self, fragment: &str) {
        self.accumulated_text.push_str(fragment);
    }

    pub fn has_text(&self) -> bool {
        !self.accumulated_text.trim().is_empty()
    }

    /// STREAMING → SUCCESS or EMPTY, depending on the text received.
    pub fn finish_stream(&mut self) -> TurnState {
        self.state = if self.has_text() {
            TurnState::Success
        } else {
            TurnState::Empty
        };
        self.state
    }

    /// STREAMING → ERROR.
    pub fn fail_attempt(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.state = TurnState::Error;
    }

    /// EMPTY/ERROR → PENDING.
    pub fn schedule_retry(&mut self) {
        debug_assert!(matches!(self.state, TurnState::Empty | TurnState::Error));
        self.retry_count += 1;
        self.state = TurnState::Pending;
    }

    /// EMPTY/ERROR → FAILED once the attempt budget is spent. The retry
    /// count stays at the last attempt's value.
    pub fn mark_failed(&mut self) {
        self.state = TurnState::Failed;
    }
}

/// How a turn ended. Failure is terminal for the turn only.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Success(Turn),
    Failed(Turn),
}

impl TurnOutcome {
    pub fn turn(&self) -> &Turn {
        match self {
            Self::Success(turn) | Self::Failed(turn) => turn,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
