//! The streamed conversation loop for mcpchat.
//!
//! A turn flows through two layers:
//!
//! 1. [`ConversationEngine`] sends the user text to the model, streams the
//!    reply as [`Delta`]s and resolves any tool calls through the
//!    [`ToolGateway`](mcpchat_core::ToolGateway) before the next round.
//! 2. [`RetryController`] wraps each turn in a bounded retry loop, records
//!    every step in the session log and reports progress to a
//!    [`TurnObserver`].
//!
//! A turn that exhausts its retries ends as [`TurnOutcome::Failed`]; it is
//! never an error for the caller.

pub mod delta;
pub mod engine;
pub mod retry;
pub mod turn;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use delta::{Delta, DeltaStream};
pub use engine::{ChatConfig, ConversationEngine};
pub use retry::{Backoff, NoopObserver, RetryController, RetryPolicy, RetryReason, TurnObserver};
pub use turn::{Turn, TurnOutcome, TurnState};
