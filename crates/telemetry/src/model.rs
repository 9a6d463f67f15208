//! Data model for session log records.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ── Call ids ──────────────────────────────────────────────────────────────

/// Reserved call id for records that belong to no user turn
/// (startup connection attempts, tool listing).
pub const SYSTEM_CALL_ID: &str = "SYSTEM";

/// Identifier scoping every record of one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId {
    value: String,
    seq: u64,
}

impl CallId {
    pub(crate) fn new(session_id: &str, seq: u64) -> Self {
        Self {
            value: format!("{session_id}-{seq:04}"),
            seq,
        }
    }

    /// The reserved `SYSTEM` id. Its sequence number is 0, below every
    /// id the logger allocates.
    pub fn system() -> Self {
        Self {
            value: SYSTEM_CALL_ID.to_string(),
            seq: 0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Identifier shared by a tool call record and its response record.
    pub fn tool_call_id(&self, tool_name: &str) -> String {
        format!("{}-tool-{}", self.value, tool_name)
    }
}

impl PartialOrd for CallId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CallId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.seq.cmp(&other.seq).then_with(|| self.value.cmp(&other.value))
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

// ── Records ───────────────────────────────────────────────────────────────

/// The kind of event a record captures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    UserQuery,
    LlmRequest,
    LlmResponse,
    ToolCall,
    ToolResponse,
    Error,
    SessionEnd,
}

impl RecordKind {
    /// Heading used for the record block in the log file.
    pub fn label(&self) -> &'static str {
        match self {
            Self::UserQuery => "USER QUERY",
            Self::LlmRequest => "LLM REQUEST",
            Self::LlmResponse => "LLM RESPONSE",
            Self::ToolCall => "TOOL CALL REQUEST",
            Self::ToolResponse => "TOOL CALL RESPONSE",
            Self::Error => "ERROR",
            Self::SessionEnd => "SESSION END",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UserQuery => "user_query",
            Self::LlmRequest => "llm_request",
            Self::LlmResponse => "llm_response",
            Self::ToolCall => "tool_call",
            Self::ToolResponse => "tool_response",
            Self::Error => "error",
            Self::SessionEnd => "session_end",
        };
        f.write_str(s)
    }
}

pub(crate) const SEPARATOR_WIDTH: usize = 80;
pub(crate) const HEADER_WIDTH: usize = 100;

/// One immutable block of the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub kind: RecordKind,
    pub timestamp: DateTime<Local>,
    /// Text after the kind label on the heading line, e.g. `Call ID: ab12cd34-0003`.
    pub heading: String,
    /// Labelled payload lines, already capped.
    pub fields: Vec<(String, String)>,
}

impl CallRecord {
    pub fn new(kind: RecordKind, heading: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Local::now(),
            heading: heading.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((label.into(), value.into()));
        self
    }

    /// Render as a log block: timestamped heading, separator, fields, separator.
    pub fn render(&self) -> String {
        let rule = "─".repeat(SEPARATOR_WIDTH);
        let mut out = format!(
            "[{}] {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f"),
            self.kind.label()
        );
        if !self.heading.is_empty() {
            out.push_str(" - ");
            out.push_str(&self.heading);
        }
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
        for (label, value) in &self.fields {
            out.push_str(label);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out.push_str(&rule);
        out.push_str("\n\n");
        out
    }
}

/// Model configuration captured with each `llm_request` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub temperature: f32,
    pub system_instruction: Option<String>,
    pub tools_available: bool,
}

// ── Session ───────────────────────────────────────────────────────────────

/// Metadata written to the header block when a session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub agent_name: String,
    pub model: String,
    pub servers: Vec<String>,
    pub optional_servers: bool,
    pub execution_directory: PathBuf,
}

/// Snapshot returned when a session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSummary {
    pub session_id: String,
    /// Where the log was written; `None` when logging was disabled or the
    /// file could not be created.
    pub log_location: Option<PathBuf>,
    pub total_calls: u64,
    pub duration: Duration,
}

/// Format a duration as `H:MM:SS.ffffff`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!(
        "{}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        duration.subsec_micros()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_id_format_and_order() {
        let a = CallId::new("ab12cd34", 1);
        let b = CallId::new("ab12cd34", 12);
        assert_eq!(a.as_str(), "ab12cd34-0001");
        assert_eq!(b.to_string(), "ab12cd34-0012");
        assert!(a < b);
        assert!(CallId::system() < a);
    }

    #[test]
    fn tool_call_id_links_call() {
        let id = CallId::new("s", 3);
        assert_eq!(id.tool_call_id("price_lookup"), "s-0003-tool-price_lookup");
        assert_eq!(
            CallId::system().tool_call_id("list_tools"),
            "SYSTEM-tool-list_tools"
        );
    }

    #[test]
    fn record_renders_block() {
        let record = CallRecord::new(RecordKind::UserQuery, "Call ID: s-0001").field("Query", "hi");
        let text = record.render();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] USER QUERY - Call ID: s-0001"));
        assert_eq!(lines[1].chars().count(), SEPARATOR_WIDTH);
        assert_eq!(lines[2], "Query: hi");
        assert_eq!(lines[3], lines[1]);
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn record_without_heading() {
        let text = CallRecord::new(RecordKind::SessionEnd, "").render();
        assert!(text.lines().next().unwrap().ends_with("] SESSION END"));
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::from_millis(3_723_500)), "1:02:03.500000");
        assert_eq!(format_duration(Duration::ZERO), "0:00:00.000000");
    }

    #[test]
    fn kind_display_matches_serde() {
        let json = serde_json::to_string(&RecordKind::ToolResponse).unwrap();
        assert_eq!(json, format!("\"{}\"", RecordKind::ToolResponse));
    }
}
