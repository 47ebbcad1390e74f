//! Core hub infrastructure: configuration, downstream clients, pooling and dispatch.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod handler;
pub mod metrics;
pub mod pool;
pub mod reconnect;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Connector, ProviderClient, RmcpConnector, RmcpProviderClient, ServerMetadata};
pub use config::{
    CallToolResult, DispatchConfig, JsonObject, McpHubConfig, McpPoolConfig, McpServerConfig,
    Tool, TransportKind,
};
pub use dispatch::{
    CallToolResponse, GetToolResponse, McpDispatcher, ServerSummary, ServersResponse, ToolDetail,
    ToolSummary, ToolsResponse,
};
pub use handler::HubClientHandler;
pub use metrics::{LatencySnapshot, McpMetrics, MetricsSnapshot};
pub use pool::{ClientHandle, ConnectionStatus, McpConnectionPool, PoolStats};
pub use reconnect::ReconnectionPolicy;
pub use transport::ProviderTransport;
