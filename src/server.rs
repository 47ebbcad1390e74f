//! The hub's own MCP endpoint.
//!
//! Exposes four tools (`list_servers`, `list_tools`, `get_tool`, `call_tool`) and
//! forwards each to the dispatcher. Responses are returned as structured content.

use std::{borrow::Cow, sync::Arc};

use hub_mcp::{config::JsonObject, McpDispatcher, McpError, McpResult};
use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult,
        PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
    ErrorData, RoleServer, ServerHandler,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

const LIST_SERVERS: &str = "list_servers";
const LIST_TOOLS: &str = "list_tools";
const GET_TOOL: &str = "get_tool";
const CALL_TOOL: &str = "call_tool";

#[derive(Debug, Deserialize)]
struct ServerArgs {
    server_name: String,
}

#[derive(Debug, Deserialize)]
struct ToolArgs {
    server_name: String,
    tool_name: String,
}

#[derive(Debug, Deserialize)]
struct CallArgs {
    server_name: String,
    tool_name: String,
    #[serde(default)]
    arguments: Option<JsonObject>,
}

#[derive(Clone)]
pub struct HubServer {
    dispatcher: McpDispatcher,
}

impl HubServer {
    pub fn new(dispatcher: McpDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Run one hub tool by name.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ErrorData> {
        let value = match name {
            LIST_SERVERS => respond(self.dispatcher.list_servers().await)?,
            LIST_TOOLS => {
                let args: ServerArgs = parse_args(arguments)?;
                respond(self.dispatcher.list_tools(&args.server_name).await)?
            }
            GET_TOOL => {
                let args: ToolArgs = parse_args(arguments)?;
                respond(
                    self.dispatcher
                        .get_tool(&args.server_name, &args.tool_name)
                        .await,
                )?
            }
            CALL_TOOL => {
                let args: CallArgs = parse_args(arguments)?;
                respond(
                    self.dispatcher
                        .call_tool(&args.server_name, &args.tool_name, args.arguments)
                        .await,
                )?
            }
            other => {
                return Err(ErrorData::invalid_params(
                    format!("Unknown tool '{}'", other),
                    None,
                ))
            }
        };

        Ok(CallToolResult::structured(value))
    }
}

impl ServerHandler for HubServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mcp-hub".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some(
                "Call list_servers to see the configured MCP servers, list_tools and \
                 get_tool to inspect a server's tools, and call_tool to invoke one."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(hub_tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        debug!(tool = %request.name, "Hub tool called");
        self.dispatch(&request.name, request.arguments).await
    }
}

/// Definitions of the tools the hub itself serves.
pub fn hub_tools() -> Vec<Tool> {
    let server_name = json!({
        "type": "string",
        "description": "Name of a configured MCP server"
    });
    let tool_name = json!({
        "type": "string",
        "description": "Name of a tool on that server"
    });

    vec![
        hub_tool(
            LIST_SERVERS,
            "List the configured MCP servers with their version and description",
            json!({ "type": "object", "properties": {} }),
        ),
        hub_tool(
            LIST_TOOLS,
            "List the tools of one MCP server",
            json!({
                "type": "object",
                "properties": { "server_name": server_name },
                "required": ["server_name"]
            }),
        ),
        hub_tool(
            GET_TOOL,
            "Get the full definition of one tool, or null if the server has no such tool",
            json!({
                "type": "object",
                "properties": { "server_name": server_name, "tool_name": tool_name },
                "required": ["server_name", "tool_name"]
            }),
        ),
        hub_tool(
            CALL_TOOL,
            "Invoke a tool on an MCP server and return its result unchanged",
            json!({
                "type": "object",
                "properties": {
                    "server_name": server_name,
                    "tool_name": tool_name,
                    "arguments": {
                        "type": "object",
                        "description": "Arguments passed to the tool"
                    }
                },
                "required": ["server_name", "tool_name"]
            }),
        ),
    ]
}

fn hub_tool(name: &'static str, description: &'static str, schema: Value) -> Tool {
    let input_schema = match schema {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };

    Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema: Arc::new(input_schema),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Option<JsonObject>) -> Result<T, ErrorData> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default()))
        .map_err(|e| to_error_data(McpError::InvalidArguments(e.to_string())))
}

fn respond<T: Serialize>(result: McpResult<T>) -> Result<Value, ErrorData> {
    let response = result.map_err(to_error_data)?;
    serde_json::to_value(response)
        .map_err(|e| ErrorData::internal_error(format!("Failed to encode response: {}", e), None))
}

/// Caller mistakes map to `invalid_params`, everything else to `internal_error`.
fn to_error_data(err: McpError) -> ErrorData {
    match err {
        McpError::ServerNotFound { .. } | McpError::InvalidArguments(_) => {
            ErrorData::invalid_params(err.to_string(), None)
        }
        _ => ErrorData::internal_error(err.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use hub_mcp::{
        Connector, DispatchConfig, McpConnectionPool, McpHubConfig, McpServerConfig,
        ProviderClient, ServerMetadata,
    };
    use rmcp::model::{Content, ErrorCode};

    use super::*;

    struct StubConnector;

    #[async_trait]
    impl Connector for StubConnector {
        async fn connect(&self, config: &McpServerConfig) -> McpResult<Arc<dyn ProviderClient>> {
            if config.name == "down" {
                return Err(McpError::ConnectionFailed("connection refused".to_string()));
            }
            Ok(Arc::new(StubClient))
        }
    }

    struct StubClient;

    #[async_trait]
    impl ProviderClient for StubClient {
        async fn metadata(&self) -> McpResult<ServerMetadata> {
            Ok(ServerMetadata {
                version: "2.1.0".to_string(),
                description: Some("stub".to_string()),
                instructions: None,
            })
        }

        async fn list_tools(&self) -> McpResult<Vec<Tool>> {
            Ok(vec![hub_tool(
                "echo",
                "Echo",
                json!({ "type": "object", "properties": {} }),
            )])
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Option<JsonObject>,
        ) -> McpResult<CallToolResult> {
            if name == "boom" {
                return Ok(CallToolResult::error(vec![Content::text("it broke")]));
            }
            Ok(CallToolResult::structured(Value::Object(
                arguments.unwrap_or_default(),
            )))
        }

        async fn close(&self) {}
    }

    fn hub(servers: &[&str]) -> HubServer {
        let config = McpHubConfig::from_servers(
            servers
                .iter()
                .map(|name| McpServerConfig::stdio(*name, "stub", &[])),
        );
        let pool = McpConnectionPool::with_connector(&config, Arc::new(StubConnector));
        HubServer::new(McpDispatcher::new(pool, DispatchConfig::default()))
    }

    fn args(value: Value) -> Option<JsonObject> {
        match value {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    fn structured(result: CallToolResult) -> Value {
        result.structured_content.unwrap()
    }

    #[test]
    fn test_hub_tools() {
        let tools = hub_tools();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_ref()).collect();
        assert_eq!(names, vec![LIST_SERVERS, LIST_TOOLS, GET_TOOL, CALL_TOOL]);

        let call = &tools[3];
        assert_eq!(
            call.input_schema.get("required"),
            Some(&json!(["server_name", "tool_name"]))
        );
    }

    #[test]
    fn test_server_info_advertises_tools() {
        let info = hub(&["a"]).get_info();
        assert!(info.capabilities.tools.is_some());
        assert_eq!(info.server_info.name, "mcp-hub");
    }

    #[tokio::test]
    async fn test_list_servers() {
        let value = structured(hub(&["a", "down"]).dispatch(LIST_SERVERS, None).await.unwrap());
        assert_eq!(value["servers"][0]["name"], "a");
        assert_eq!(value["servers"][0]["version"], "2.1.0");
        assert_eq!(value["servers"][1]["name"], "down");
        assert!(value["servers"][1]["error"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_missing_argument_is_invalid_params() {
        let err = hub(&["a"]).dispatch(LIST_TOOLS, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("server_name"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_unknown_server_is_invalid_params() {
        let err = hub(&["a", "b"])
            .dispatch(LIST_TOOLS, args(json!({ "server_name": "c" })))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("a, b"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_connect_failure_is_internal_error() {
        let err = hub(&["down"])
            .dispatch(LIST_TOOLS, args(json!({ "server_name": "down" })))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_unknown_hub_tool() {
        let err = hub(&["a"]).dispatch("launch", None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_get_tool() {
        let hub = hub(&["a"]);

        let found = structured(
            hub.dispatch(GET_TOOL, args(json!({ "server_name": "a", "tool_name": "echo" })))
                .await
                .unwrap(),
        );
        assert_eq!(found["tool"]["name"], "echo");
        assert!(found["tool"]["inputSchema"].is_object());

        let missing = structured(
            hub.dispatch(GET_TOOL, args(json!({ "server_name": "a", "tool_name": "nope" })))
                .await
                .unwrap(),
        );
        assert_eq!(missing, json!({ "server_name": "a", "tool": null }));
    }

    #[tokio::test]
    async fn test_call_tool_passes_through() {
        let hub = hub(&["a"]);

        let ok = structured(
            hub.dispatch(
                CALL_TOOL,
                args(json!({
                    "server_name": "a",
                    "tool_name": "echo",
                    "arguments": { "x": 1 }
                })),
            )
            .await
            .unwrap(),
        );
        assert_eq!(ok["tool_name"], "echo");
        assert_eq!(ok["result"]["structuredContent"], json!({ "x": 1 }));

        let failed = structured(
            hub.dispatch(CALL_TOOL, args(json!({ "server_name": "a", "tool_name": "boom" })))
                .await
                .unwrap(),
        );
        assert_eq!(failed["result"]["isError"], true);
        assert_eq!(failed["result"]["content"][0]["text"], "it broke");
    }
}
