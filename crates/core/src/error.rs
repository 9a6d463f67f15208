//! Error types for the mcpchat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] unifies them for
//! the conversation loop.

use thiserror::Error;

/// The top-level error type for a conversation turn.
#[derive(Debug, Error)]
pub enum Error {
    /// The chat transport failed before or during streaming.
    #[error("Stream transport error: {0}")]
    Provider(#[from] ProviderError),

    /// A tool gateway call failed at the transport level.
    #[error("Tool gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The stream completed without producing any text.
    #[error("Empty response received")]
    EmptyResponse,

    #[error("Internal error: {0}")]
    Internal(String),
}

// --- Bounded context errors ---

/// Chat transport failures.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode stream chunk: {0}")]
    Decode(String),
}

/// Tool gateway failures.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Cannot reach MCP server '{server}': {reason}")]
    Connection { server: String, reason: String },

    #[error("Transport failure talking to '{server}': {reason}")]
    Transport { server: String, reason: String },

    #[error("MCP server '{server}' returned error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("No MCP servers configured")]
    NoServers,
}

impl GatewayError {
    /// Whether trying again may succeed. Configuration and protocol
    /// errors are not transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Connection { .. } | GatewayError::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn gateway_error_displays_server() {
        let err = Error::Gateway(GatewayError::Rpc {
            server: "heurist".into(),
            code: -32601,
            message: "Method not found".into(),
        });
        assert!(err.to_string().contains("heurist"));
        assert!(err.to_string().contains("-32601"));
    }

    #[test]
    fn only_network_failures_are_transient() {
        let unreachable = GatewayError::Connection {
            server: "a".into(),
            reason: "refused".into(),
        };
        let dropped = GatewayError::Transport {
            server: "a".into(),
            reason: "reset".into(),
        };
        assert!(unreachable.is_transient());
        assert!(dropped.is_transient());
        assert!(!GatewayError::NoServers.is_transient());
        assert!(!GatewayError::ToolNotFound("x".into()).is_transient());
    }
}
