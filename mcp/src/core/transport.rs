//! Transport factory.
//!
//! Builds the rmcp transport for a server from its configuration. Nothing is
//! connected here: the MCP handshake happens when a client is served over the
//! returned transport.

use std::process::Stdio;

use rmcp::transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess};
use tracing::debug;

use super::config::{McpServerConfig, TransportKind};
use crate::error::{McpError, McpResult};

/// An unconnected transport to one downstream server.
pub enum ProviderTransport {
    /// Child process speaking MCP over stdin/stdout
    Pipe(TokioChildProcess),
    /// Streamable HTTP endpoint
    Streaming(StreamableHttpClientTransport<reqwest::Client>),
}

impl ProviderTransport {
    pub fn kind(&self) -> TransportKind {
        match self {
            ProviderTransport::Pipe(_) => TransportKind::Stdio,
            ProviderTransport::Streaming(_) => TransportKind::Streamable,
        }
    }
}

/// Build the transport described by `config`.
///
/// `command` selects a child-process transport, `url` a streamable HTTP one.
/// Anything else is an [`McpError::InvalidServerConfig`].
pub fn build(config: &McpServerConfig) -> McpResult<ProviderTransport> {
    match config.transport_kind()? {
        TransportKind::Stdio => {
            let command = config.command.as_deref().unwrap_or_default();
            debug!(
                server = %config.name,
                command = %command,
                args = ?config.args,
                "Spawning stdio MCP server"
            );

            let transport = TokioChildProcess::new(
                tokio::process::Command::new(command).configure(|cmd| {
                    cmd.args(&config.args)
                        .envs(config.env.iter())
                        .stderr(Stdio::inherit());
                }),
            )
            .map_err(|e| {
                McpError::Transport(format!(
                    "create stdio transport for '{}': {}",
                    config.name, e
                ))
            })?;

            Ok(ProviderTransport::Pipe(transport))
        }
        TransportKind::Streamable => {
            let url = config.url.as_deref().unwrap_or_default();
            debug!(server = %config.name, url = %url, "Creating streamable HTTP transport");
            Ok(ProviderTransport::Streaming(
                StreamableHttpClientTransport::from_uri(url.to_string()),
            ))
        }
    }
}
