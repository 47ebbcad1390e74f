//! Downstream MCP client abstraction.
//!
//! The pool only knows about [`Connector`] and [`ProviderClient`]. The rmcp-backed
//! implementations live here; tests substitute their own.

use std::{borrow::Cow, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::{
    model::CallToolRequestParam,
    service::{Peer, RunningService},
    RoleClient, ServiceError, ServiceExt,
};
use tracing::{debug, info, warn};

use super::{
    config::{CallToolResult, JsonObject, McpServerConfig, Tool},
    handler::HubClientHandler,
    transport::{self, ProviderTransport},
};
use crate::error::{McpError, McpResult};

type McpClient = RunningService<RoleClient, HubClientHandler>;

/// What a server reported about itself during initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMetadata {
    pub version: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
}

/// A live, initialized connection to one downstream server.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn metadata(&self) -> McpResult<ServerMetadata>;

    async fn list_tools(&self) -> McpResult<Vec<Tool>>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult>;

    /// Best-effort shutdown of the client and its transport. Never fails.
    async fn close(&self);
}

/// Establishes connections for the pool.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &McpServerConfig) -> McpResult<Arc<dyn ProviderClient>>;
}

/// Connects through rmcp using the transport factory.
#[derive(Debug, Default, Clone, Copy)]
pub struct RmcpConnector;

#[async_trait]
impl Connector for RmcpConnector {
    async fn connect(&self, config: &McpServerConfig) -> McpResult<Arc<dyn ProviderClient>> {
        let transport = transport::build(config)?;
        let kind = transport.kind();
        let handler = HubClientHandler::new(&config.name);

        info!(server = %config.name, transport = ?kind, "Connecting to MCP server");

        let service = match transport {
            ProviderTransport::Pipe(t) => handler.serve(t).await,
            ProviderTransport::Streaming(t) => handler.serve(t).await,
        }
        .map_err(|e| {
            McpError::ConnectionFailed(format!(
                "initialize {:?} client for '{}': {}",
                kind, config.name, e
            ))
        })?;

        info!(server = %config.name, transport = ?kind, "Connected to MCP server");
        Ok(Arc::new(RmcpProviderClient::new(&config.name, service)))
    }
}

/// [`ProviderClient`] over a running rmcp client service.
pub struct RmcpProviderClient {
    server_name: Arc<str>,
    peer: Peer<RoleClient>,
    // Taken on close; the peer stays usable and reports a closed transport.
    service: Mutex<Option<McpClient>>,
}

impl RmcpProviderClient {
    fn new(server_name: &str, service: McpClient) -> Self {
        Self {
            server_name: Arc::from(server_name),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }
}

#[async_trait]
impl ProviderClient for RmcpProviderClient {
    async fn metadata(&self) -> McpResult<ServerMetadata> {
        let info = self.peer.peer_info().ok_or_else(|| {
            McpError::ConnectionFailed(format!(
                "server '{}' did not report initialization info",
                self.server_name
            ))
        })?;

        Ok(ServerMetadata {
            version: info.server_info.version.clone(),
            description: info.server_info.title.clone(),
            instructions: info.instructions.clone(),
        })
    }

    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.peer
            .list_all_tools()
            .await
            .map_err(|e| map_service_error(&self.server_name, "list tools", e))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult> {
        let request = CallToolRequestParam {
            name: Cow::Owned(name.to_string()),
            arguments,
        };

        self.peer
            .call_tool(request)
            .await
            .map_err(|e| map_service_error(&self.server_name, "call tool", e))
    }

    async fn close(&self) {
        let service = self.service.lock().take();
        let Some(service) = service else {
            return;
        };

        match service.cancel().await {
            Ok(reason) => debug!(server = %self.server_name, reason = ?reason, "MCP client closed"),
            Err(e) => warn!(server = %self.server_name, error = %e, "Error closing MCP client"),
        }
    }
}

/// Translate an rmcp service error. A dead transport becomes
/// [`McpError::ConnectionClosed`] so the pool can retire the connection.
fn map_service_error(server_name: &str, op: &str, err: ServiceError) -> McpError {
    match err {
        ServiceError::TransportClosed | ServiceError::TransportSend(_) => {
            McpError::ConnectionClosed(server_name.to_string())
        }
        ServiceError::McpError(data) => {
            McpError::Transport(format!("{} on '{}': {}", op, server_name, data.message))
        }
        other => McpError::Transport(format!("{} on '{}': {}", op, server_name, other)),
    }
}
