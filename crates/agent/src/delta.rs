//! Incremental units of a streamed turn.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::ReceiverStream;

/// One observable step of a turn, in generation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    /// A fragment of the assistant's reply.
    Text { fragment: String },

    /// The model asked for a tool. The engine performs the call itself.
    ToolInvocation {
        name: String,
        arguments: serde_json::Value,
    },

    /// A tool call the engine performed finished.
    ToolResult {
        name: String,
        success: bool,
        output: String,
    },
}

impl Delta {
    pub fn text(fragment: impl Into<String>) -> Self {
        Self::Text {
            fragment: fragment.into(),
        }
    }
}

/// Single-pass stream of one turn's deltas.
///
/// Finite: it ends when the model has nothing more to say, or right after
/// yielding an error. Dropping it stops the turn.
pub struct DeltaStream {
    inner: ReceiverStream<Result<Delta, mcpchat_core::Error>>,
    task: AbortHandle,
}

impl DeltaStream {
    pub(crate) fn new(
        rx: tokio::sync::mpsc::Receiver<Result<Delta, mcpchat_core::Error>>,
        task: AbortHandle,
    ) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            task,
        }
    }
}

impl Stream for DeltaStream {
    type Item = Result<Delta, mcpchat_core::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for DeltaStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_serialization_is_tagged() {
        let json = serde_json::to_string(&Delta::text("BTC is")).unwrap();
        assert!(json.contains(r#""type":"text""#));
        assert!(json.contains(r#""fragment":"BTC is""#));
    }
}
