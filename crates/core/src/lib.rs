//! # mcpchat Core
//!
//! Domain types, traits, and error definitions for the mcpchat terminal agent.
//! This crate has **no transport dependencies**; it defines the model every
//! other crate implements against.
//!
//! ## Seams
//!
//! - [`Provider`] is the chat transport: it turns a conversation into a
//!   finite stream of normalized [`StreamChunk`]s.
//! - [`ToolGateway`] is the connection to the tool-providing services.
//!
//! Both are traits so the conversation loop can be driven by scripted
//! implementations in tests.

pub mod error;
pub mod gateway;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GatewayError, ProviderError};
pub use gateway::{ToolDefinition, ToolGateway, ToolOutput};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, Usage};
