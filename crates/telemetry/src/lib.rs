//! Session execution log for mcpchat.
//!
//! Every user query, model request/response, tool call and error of one
//! process run is appended to a single human-readable log file as soon as
//! it happens. Records within a session are scoped by call ids of the form
//! `{session_id}-{NNNN}`.
//!
//! Logging is best effort: a [`SessionLogger`] never returns an error to
//! its caller. Sink failures are reported through `tracing` and dropped.

pub mod model;
pub mod sanitize;
pub mod session;
pub mod sink;

pub use model::{CallId, CallRecord, LogSummary, RecordKind, RequestSnapshot, SessionInfo};
pub use sanitize::{TRUNCATION_MARKER, truncate};
pub use session::SessionLogger;
pub use sink::{FileSink, LogSink, MemorySink, NullSink};

use std::path::PathBuf;

/// Errors from a log sink. Never surfaced past [`SessionLogger`].
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("cannot write session log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session log sink lock poisoned")]
    Poisoned,
}
