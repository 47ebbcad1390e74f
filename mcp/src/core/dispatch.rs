//! Routes hub operations to pooled provider connections.
//!
//! Fan-out over providers is bounded by [`DispatchConfig::max_concurrent_fetches`]
//! and keeps configuration order in its output.

use std::time::Instant;

use futures::{stream, StreamExt};
use rmcp::model::ToolAnnotations;
use serde::Serialize;
use tracing::{debug, warn};

use super::{
    client::ServerMetadata,
    config::{CallToolResult, DispatchConfig, JsonObject, Tool},
    pool::{ClientHandle, McpConnectionPool},
};
use crate::error::{McpError, McpResult};

/// One entry of `list_servers`. Failed providers carry `error` instead of metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerSummary {
    fn connected(name: String, metadata: ServerMetadata) -> Self {
        Self {
            name,
            version: Some(metadata.version),
            description: metadata.description,
            instructions: metadata.instructions,
            error: None,
        }
    }

    fn failed(name: String, error: &McpError) -> Self {
        Self {
            name,
            version: None,
            description: None,
            instructions: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServersResponse {
    pub servers: Vec<ServerSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Tool> for ToolSummary {
    fn from(tool: &Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.as_deref().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolsResponse {
    pub server_name: String,
    pub tools: Vec<ToolSummary>,
}

/// Full tool definition as reported by the provider.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDetail {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonObject,
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<JsonObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

impl From<Tool> for ToolDetail {
    fn from(tool: Tool) -> Self {
        Self {
            name: tool.name.into_owned(),
            description: tool.description.map(|d| d.into_owned()),
            input_schema: (*tool.input_schema).clone(),
            output_schema: tool.output_schema.as_deref().cloned(),
            annotations: tool.annotations,
        }
    }
}

/// `tool` is `null` when the provider has no tool by that name.
#[derive(Debug, Clone, Serialize)]
pub struct GetToolResponse {
    pub server_name: String,
    pub tool: Option<ToolDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallToolResponse {
    pub server_name: String,
    pub tool_name: String,
    pub result: CallToolResult,
}

/// Front door for hub operations.
#[derive(Clone)]
pub struct McpDispatcher {
    pool: McpConnectionPool,
    config: DispatchConfig,
}

impl McpDispatcher {
    pub fn new(pool: McpConnectionPool, config: DispatchConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &McpConnectionPool {
        &self.pool
    }

    /// Describe every configured provider.
    ///
    /// A provider that cannot be reached shows up with `error` set, unless
    /// `fail_fast` is on, in which case the first failure fails the whole call.
    pub async fn list_servers(&self) -> McpResult<ServersResponse> {
        let names = self.pool.server_names();
        let limit = self.config.max_concurrent_fetches.max(1);
        debug!(count = names.len(), limit, "Fetching server metadata");

        let mut fetches = stream::iter(names.into_iter().map(|name| async move {
            let result = self.describe(&name).await;
            (name, result)
        }))
        .buffered(limit);

        let mut servers = Vec::new();
        while let Some((name, result)) = fetches.next().await {
            match result {
                Ok(metadata) => servers.push(ServerSummary::connected(name, metadata)),
                Err(e) if self.config.fail_fast => return Err(e),
                Err(e) => {
                    warn!(server = %name, error = %e, "Failed to describe MCP server");
                    servers.push(ServerSummary::failed(name, &e));
                }
            }
        }

        Ok(ServersResponse { servers })
    }

    pub async fn list_tools(&self, server_name: &str) -> McpResult<ToolsResponse> {
        let tools = self.fetch_tools(server_name).await?;
        Ok(ToolsResponse {
            server_name: server_name.to_string(),
            tools: tools.iter().map(ToolSummary::from).collect(),
        })
    }

    pub async fn get_tool(
        &self,
        server_name: &str,
        tool_name: &str,
    ) -> McpResult<GetToolResponse> {
        let tools = self.fetch_tools(server_name).await?;
        let tool = tools
            .into_iter()
            .find(|t| t.name == tool_name)
            .map(ToolDetail::from);

        if tool.is_none() {
            debug!(server = %server_name, tool = %tool_name, "Tool not found");
        }

        Ok(GetToolResponse {
            server_name: server_name.to_string(),
            tool,
        })
    }

    /// Invoke a tool. The provider's result, including `isError`, is returned as is.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResponse> {
        let client = self.pool.acquire(server_name).await?;

        let start = Instant::now();
        let result = client.call_tool(tool_name, arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let success = matches!(&result, Ok(r) if !r.is_error.unwrap_or(false));
        self.pool
            .metrics()
            .record_call(server_name, tool_name, success, duration_ms);
        debug!(
            server = %server_name,
            tool = %tool_name,
            success,
            duration_ms,
            "Tool call finished"
        );

        let result = self.observe(server_name, &client, result).await?;
        Ok(CallToolResponse {
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
            result,
        })
    }

    async fn describe(&self, server_name: &str) -> McpResult<ServerMetadata> {
        let client = self.pool.acquire(server_name).await?;
        let result = client.metadata().await;
        self.observe(server_name, &client, result).await
    }

    async fn fetch_tools(&self, server_name: &str) -> McpResult<Vec<Tool>> {
        let client = self.pool.acquire(server_name).await?;
        let result = client.list_tools().await;
        self.observe(server_name, &client, result).await
    }

    /// Retire the connection when a call reports its transport gone.
    async fn observe<T>(
        &self,
        server_name: &str,
        client: &ClientHandle,
        result: McpResult<T>,
    ) -> McpResult<T> {
        if let Err(e) = &result {
            if e.is_connection_lost() {
                self.pool.mark_closed(server_name, client).await;
            }
        }
        result
    }
}
