//! MCP hub error types.
//!
//! Every variant carries owned strings so errors are `Clone`: a single connect
//! attempt is shared by all callers waiting on it, and each of them receives the
//! same failure.

use std::time::Duration;

use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Clone, Error)]
pub enum McpError {
    #[error("Server '{name}' not found. Available servers: {available}")]
    ServerNotFound { name: String, available: String },

    #[error("Invalid configuration for server '{name}': {reason}")]
    InvalidServerConfig { name: String, reason: String },

    #[error("Connection pool is shutting down, cannot connect to '{0}'")]
    PoolClosing(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connecting to '{server}' timed out after {timeout:?}")]
    ConnectTimeout { server: String, timeout: Duration },

    #[error("Connection to '{0}' is closed")]
    ConnectionClosed(String),

    #[error("Max reconnect attempts ({attempts}) reached for server '{server}'")]
    MaxReconnectAttemptsReached { server: String, attempts: u32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl McpError {
    pub(crate) fn server_not_found<'a>(
        name: &str,
        available: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        let available: Vec<&str> = available.into_iter().map(String::as_str).collect();
        McpError::ServerNotFound {
            name: name.to_string(),
            available: if available.is_empty() {
                "(none)".to_string()
            } else {
                available.join(", ")
            },
        }
    }

    /// True when the underlying transport went away and the pooled connection
    /// should no longer be handed out.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, McpError::ConnectionClosed(_))
    }
}
