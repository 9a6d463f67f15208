//! The session logger: one per process run.

use chrono::{DateTime, Local};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::model::{
    CallId, CallRecord, HEADER_WIDTH, LogSummary, RecordKind, RequestSnapshot, SessionInfo,
    format_duration,
};
use crate::sanitize::{json_payload, truncate};
use crate::sink::{FileSink, LogSink, NullSink};

/// Longest system instruction copied into an `llm_request` config snapshot.
const SNAPSHOT_INSTRUCTION_CHARS: usize = 500;

/// Append-only structured logger for one chat session.
///
/// Every method takes `&self` and never fails; the logger is shared as
/// `Arc<SessionLogger>` between startup, the retry loop and the shell.
pub struct SessionLogger {
    session_id: String,
    started_at: DateTime<Local>,
    started: Instant,
    counter: AtomicU64,
    ended: AtomicBool,
    max_payload_chars: usize,
    sink: Box<dyn LogSink>,
}

impl SessionLogger {
    /// Start a session on `sink` and write the header block.
    pub fn start_session(info: &SessionInfo, sink: Box<dyn LogSink>, max_payload_chars: usize) -> Self {
        let session_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let logger = Self {
            session_id,
            started_at: Local::now(),
            started: Instant::now(),
            counter: AtomicU64::new(0),
            ended: AtomicBool::new(false),
            max_payload_chars,
            sink,
        };
        logger.write_header(info);
        tracing::info!(session_id = %logger.session_id, "Session started");
        logger
    }

    /// Start a session logging to `path`. If the file cannot be created the
    /// session still starts, with logging disabled.
    pub fn to_file(path: &Path, info: &SessionInfo, max_payload_chars: usize) -> Self {
        let sink: Box<dyn LogSink> = match FileSink::create(path) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                tracing::warn!(error = %e, "Session log disabled");
                Box::new(NullSink)
            }
        };
        Self::start_session(info, sink, max_payload_chars)
    }

    /// A session that records nothing.
    pub fn disabled(info: &SessionInfo) -> Self {
        Self::start_session(info, Box::new(NullSink), usize::MAX)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Number of call ids allocated so far.
    pub fn total_calls(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Allocate the next call id. Ids are strictly increasing.
    pub fn next_call_id(&self) -> CallId {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        CallId::new(&self.session_id, seq)
    }

    /// Append one record. Failures are logged and dropped.
    pub fn record(&self, record: &CallRecord) {
        if let Err(e) = self.sink.append(&record.render()) {
            tracing::warn!(error = %e, kind = %record.kind, "Failed to write log record");
        }
    }

    fn cap(&self, text: &str) -> String {
        truncate(text, self.max_payload_chars).into_owned()
    }

    /// Log a user query under a freshly allocated call id.
    pub fn log_user_query(&self, query: &str) -> CallId {
        let call_id = self.next_call_id();
        self.record(
            &CallRecord::new(RecordKind::UserQuery, format!("Call ID: {call_id}"))
                .field("Query", self.cap(query)),
        );
        call_id
    }

    pub fn log_llm_request(&self, call_id: &CallId, model: &str, snapshot: &RequestSnapshot, message: &str) {
        let instruction = snapshot.system_instruction.as_deref().map(|s| {
            if s.chars().count() > SNAPSHOT_INSTRUCTION_CHARS {
                let head: String = s.chars().take(SNAPSHOT_INSTRUCTION_CHARS).collect();
                format!("{head}...")
            } else {
                s.to_string()
            }
        });
        let config = serde_json::json!({
            "temperature": snapshot.temperature,
            "system_instruction": instruction,
            "tools_available": snapshot.tools_available,
        });

        self.record(
            &CallRecord::new(RecordKind::LlmRequest, format!("Call ID: {call_id}"))
                .field("Model", model)
                .field("Config", json_payload(&config, self.max_payload_chars))
                .field("Message", self.cap(message)),
        );
    }

    pub fn log_llm_response(&self, call_id: &CallId, response: &str, tools_called: &[String]) {
        let tools = if tools_called.is_empty() {
            "None".to_string()
        } else {
            tools_called.join(", ")
        };
        self.record(
            &CallRecord::new(RecordKind::LlmResponse, format!("Call ID: {call_id}"))
                .field("Tools Called", self.cap(&tools))
                .field("Response Length", format!("{} characters", response.chars().count()))
                .field("Response", self.cap(response)),
        );
    }

    /// Log a tool call request. Returns the tool call id that links it to
    /// its response record.
    pub fn log_tool_call(
        &self,
        call_id: &CallId,
        tool_name: &str,
        arguments: &serde_json::Value,
        server: Option<&str>,
    ) -> String {
        let tool_call_id = call_id.tool_call_id(tool_name);
        let args = match arguments {
            serde_json::Value::Null => "None".to_string(),
            serde_json::Value::Object(map) if map.is_empty() => "None".to_string(),
            other => json_payload(other, self.max_payload_chars),
        };

        self.record(
            &CallRecord::new(
                RecordKind::ToolCall,
                format!("Call ID: {call_id} - Tool Call ID: {tool_call_id}"),
            )
            .field("Tool Name", tool_name)
            .field("Server", server.unwrap_or("Unknown"))
            .field("Arguments", args),
        );
        tool_call_id
    }

    pub fn log_tool_response(&self, tool_call_id: &str, success: bool, body: &str) {
        let status = if success { "SUCCESS" } else { "ERROR" };
        let label = if success { "Response" } else { "Error" };
        self.record(
            &CallRecord::new(
                RecordKind::ToolResponse,
                format!("Tool Call ID: {tool_call_id} - Status: {status}"),
            )
            .field(label, self.cap(body)),
        );
    }

    pub fn log_error(&self, call_id: &CallId, error: &str, context: Option<&str>) {
        self.record(
            &CallRecord::new(RecordKind::Error, format!("Call ID: {call_id}"))
                .field("Error", self.cap(error))
                .field("Context", context.map(|c| self.cap(c)).unwrap_or_else(|| "None".into())),
        );
    }

    /// Append the session summary record. Only the first call writes;
    /// later calls return the same summary without logging again.
    pub fn end_session(&self) -> LogSummary {
        let summary = self.summary();
        if self.ended.swap(true, Ordering::SeqCst) {
            return summary;
        }

        let file_name = summary
            .log_location
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "None".into());

        self.record(
            &CallRecord::new(RecordKind::SessionEnd, "")
                .field("Session Duration", format_duration(summary.duration))
                .field("Total Calls Made", summary.total_calls.to_string())
                .field("Log File", file_name),
        );
        tracing::info!(
            session_id = %summary.session_id,
            total_calls = summary.total_calls,
            "Session ended"
        );
        summary
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Current summary without ending the session.
    pub fn summary(&self) -> LogSummary {
        LogSummary {
            session_id: self.session_id.clone(),
            log_location: self.sink.location(),
            total_calls: self.total_calls(),
            duration: self.started.elapsed(),
        }
    }

    fn write_header(&self, info: &SessionInfo) {
        let meta = serde_json::json!({
            "session_id": self.session_id,
            "session_start": self.started_at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            "agent_name": info.agent_name,
            "model": info.model,
            "mcp_servers": info.servers,
            "optional_servers": info.optional_servers,
            "execution_directory": info.execution_directory.display().to_string(),
        });
        let rule = "=".repeat(HEADER_WIDTH);
        let title = format!("{} EXECUTION LOG", info.agent_name.to_uppercase());
        let block = format!(
            "{rule}\n{title}\n{rule}\nSession Info: {}\n{rule}\n\n",
            serde_json::to_string_pretty(&meta).unwrap_or_default()
        );
        if let Err(e) = self.sink.append(&block) {
            tracing::warn!(error = %e, "Failed to write session header");
        }
    }
}

impl std::fmt::Debug for SessionLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLogger")
            .field("session_id", &self.session_id)
            .field("total_calls", &self.total_calls())
            .field("log_location", &self.sink.location())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogError;
    use crate::sanitize::TRUNCATION_MARKER;
    use crate::sink::MemorySink;
    use std::path::PathBuf;

    fn info() -> SessionInfo {
        SessionInfo {
            agent_name: "Research Agent".into(),
            model: "gemini-2.5-flash".into(),
            servers: vec!["heurist".into()],
            optional_servers: false,
            execution_directory: PathBuf::from("/work"),
        }
    }

    fn memory_logger(cap: usize) -> (SessionLogger, MemorySink) {
        let sink = MemorySink::new();
        let logger = SessionLogger::start_session(&info(), Box::new(sink.clone()), cap);
        (logger, sink)
    }

    struct FailingSink;

    impl LogSink for FailingSink {
        fn append(&self, _block: &str) -> Result<(), LogError> {
            Err(LogError::Poisoned)
        }
    }

    #[test]
    fn header_contains_session_metadata() {
        let (logger, sink) = memory_logger(10_000);
        let log = sink.contents();
        assert!(log.starts_with(&"=".repeat(100)));
        assert!(log.contains("RESEARCH AGENT EXECUTION LOG"));
        assert!(log.contains(logger.session_id()));
        assert!(log.contains("\"execution_directory\": \"/work\""));
        assert!(log.contains("\"mcp_servers\""));
    }

    #[test]
    fn call_ids_strictly_increase() {
        let (logger, _) = memory_logger(10_000);
        let ids: Vec<CallId> = (0..50).map(|_| logger.next_call_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids[0].as_str(), format!("{}-0001", logger.session_id()));
        assert_eq!(logger.total_calls(), 50);
    }

    #[test]
    fn session_ids_are_short_and_distinct() {
        let (a, _) = memory_logger(100);
        let (b, _) = memory_logger(100);
        assert_eq!(a.session_id().len(), 8);
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn user_query_allocates_call_id() {
        let (logger, sink) = memory_logger(10_000);
        let id = logger.log_user_query("price of BTC?");
        assert_eq!(id.seq(), 1);
        let log = sink.contents();
        assert!(log.contains(&format!("USER QUERY - Call ID: {id}")));
        assert!(log.contains("Query: price of BTC?"));
    }

    #[test]
    fn tool_call_and_response_share_id() {
        let (logger, sink) = memory_logger(10_000);
        let id = logger.next_call_id();
        let tool_id = logger.log_tool_call(
            &id,
            "price_lookup",
            &serde_json::json!({"symbol": "BTC"}),
            Some("heurist"),
        );
        logger.log_tool_response(&tool_id, true, "60000");
        logger.log_tool_response(&tool_id, false, "boom");

        let log = sink.contents();
        assert!(log.contains(&format!("Tool Call ID: {tool_id}")));
        assert!(log.contains("Server: heurist"));
        assert!(log.contains(&format!("Tool Call ID: {tool_id} - Status: SUCCESS")));
        assert!(log.contains("Response: 60000"));
        assert!(log.contains(&format!("Tool Call ID: {tool_id} - Status: ERROR")));
        assert!(log.contains("Error: boom"));
    }

    #[test]
    fn llm_request_snapshot_truncates_instruction() {
        let (logger, sink) = memory_logger(10_000);
        let id = logger.next_call_id();
        let snapshot = RequestSnapshot {
            temperature: 0.1,
            system_instruction: Some("s".repeat(800)),
            tools_available: true,
        };
        logger.log_llm_request(&id, "gemini-2.5-flash", &snapshot, "hello");

        let log = sink.contents();
        assert!(log.contains("Model: gemini-2.5-flash"));
        assert!(log.contains(&format!("{}...", "s".repeat(500))));
        assert!(!log.contains(&"s".repeat(501)));
        assert!(log.contains("\"tools_available\": true"));
        assert!(log.contains("Message: hello"));
    }

    #[test]
    fn payloads_never_exceed_cap() {
        let cap = 256;
        let (logger, sink) = memory_logger(cap);
        let id = logger.next_call_id();
        let huge = "y".repeat(10 * cap);
        logger.log_llm_response(&id, &huge, &[]);
        logger.log_error(&id, &huge, Some(&huge));

        let log = sink.contents();
        for line in log.lines() {
            if let Some((_, value)) = line.split_once(": ") {
                if value.starts_with('y') {
                    assert!(value.chars().count() <= cap);
                    assert!(value.ends_with(TRUNCATION_MARKER));
                }
            }
        }
        assert!(log.contains(&format!("Response Length: {} characters", 10 * cap)));
        assert!(log.contains("Tools Called: None"));
    }

    #[test]
    fn end_session_is_idempotent() {
        let (logger, sink) = memory_logger(10_000);
        logger.log_user_query("a");
        logger.log_user_query("b");

        let first = logger.end_session();
        let second = logger.end_session();

        assert_eq!(first.total_calls, 2);
        assert_eq!(second.total_calls, 2);
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(sink.contents().matches("SESSION END").count(), 1);
        assert!(sink.contents().contains("Total Calls Made: 2"));
        assert!(logger.is_ended());
    }

    #[test]
    fn sink_failures_are_swallowed() {
        let logger = SessionLogger::start_session(&info(), Box::new(FailingSink), 100);
        let id = logger.log_user_query("still works");
        logger.log_error(&id, "x", None);
        let summary = logger.end_session();
        assert_eq!(summary.total_calls, 1);
        assert!(summary.log_location.is_none());
    }

    #[test]
    fn file_logger_writes_durably() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".log").join("mcpchat_execution.logs");
        let logger = SessionLogger::to_file(&path, &info(), 10_000);
        let id = logger.log_user_query("persisted");

        // Readable before the session ends.
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(&format!("Call ID: {id}")));

        let summary = logger.end_session();
        assert_eq!(summary.log_location, Some(path.clone()));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Log File: mcpchat_execution.logs"));
    }

    #[test]
    fn unopenable_file_falls_back_to_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let logger = SessionLogger::to_file(&blocker.join("x.logs"), &info(), 100);
        logger.log_user_query("ignored");
        assert!(logger.end_session().log_location.is_none());
    }
}
