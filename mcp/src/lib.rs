//! Model Context Protocol (MCP) hub: one endpoint in front of many MCP servers.
//!
//! ## Modules
//!
//! - [`core`]: configuration, connection pool, reconnect policy and dispatch
//! - [`error`]: error taxonomy shared by every layer

pub mod core;
pub mod error;

// Re-export from core
pub use core::{
    config, dispatch, pool as connection_pool, CallToolResponse, ClientHandle, ConnectionStatus,
    Connector, DispatchConfig, GetToolResponse, HubClientHandler, LatencySnapshot,
    McpConnectionPool, McpDispatcher, McpHubConfig, McpMetrics, McpPoolConfig, McpServerConfig,
    MetricsSnapshot, PoolStats, ProviderClient, ReconnectionPolicy, RmcpConnector, ServerMetadata,
    ServerSummary, ServersResponse, ToolDetail, ToolSummary, ToolsResponse, TransportKind,
};
pub use error::{McpError, McpResult};
