//! In-memory connector and client for pool and dispatch tests.

use std::{
    borrow::Cow,
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::model::Content;
use serde_json::json;

use super::{
    client::{Connector, ProviderClient, ServerMetadata},
    config::{CallToolResult, JsonObject, McpHubConfig, McpServerConfig, Tool},
};
use crate::error::{McpError, McpResult};

/// Tracks how many operations are running at once and the peak.
#[derive(Default)]
pub(crate) struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct MockConnector {
    connects: AtomicUsize,
    delay: Duration,
    failing: Mutex<HashSet<String>>,
    clients: Mutex<Vec<Arc<MockClient>>>,
    pub(crate) connecting: Arc<Gauge>,
    pub(crate) fetching: Arc<Gauge>,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connects and metadata fetches each take `delay`.
    pub(crate) fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub(crate) fn fail(&self, server: &str) {
        self.failing.lock().insert(server.to_string());
    }

    pub(crate) fn recover(&self, server: &str) {
        self.failing.lock().remove(server);
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Clients handed out so far, in connect order.
    pub(crate) fn clients(&self) -> Vec<Arc<MockClient>> {
        self.clients.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &McpServerConfig) -> McpResult<Arc<dyn ProviderClient>> {
        let id = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.connecting.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.connecting.exit();

        if self.failing.lock().contains(&config.name) {
            return Err(McpError::ConnectionFailed(format!(
                "mock refused '{}'",
                config.name
            )));
        }

        let client = Arc::new(MockClient {
            server: config.name.clone(),
            id,
            delay: self.delay,
            fetching: Arc::clone(&self.fetching),
            closed: AtomicBool::new(false),
            lost: AtomicBool::new(false),
        });
        self.clients.lock().push(Arc::clone(&client));
        Ok(client)
    }
}

pub(crate) struct MockClient {
    server: String,
    pub(crate) id: usize,
    delay: Duration,
    fetching: Arc<Gauge>,
    closed: AtomicBool,
    lost: AtomicBool,
}

impl MockClient {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make every later call fail as if the transport died.
    pub(crate) fn lose_transport(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    fn check_transport(&self) -> McpResult<()> {
        if self.lost.load(Ordering::SeqCst) || self.is_closed() {
            return Err(McpError::ConnectionClosed(self.server.clone()));
        }
        Ok(())
    }
}

pub(crate) fn tool(name: &str, description: Option<&str>) -> Tool {
    let schema = json!({
        "type": "object",
        "properties": { "text": { "type": "string" } }
    });
    let schema: JsonObject = serde_json::from_value(schema).unwrap();

    Tool {
        name: Cow::Owned(name.to_string()),
        title: None,
        description: description.map(|d| Cow::Owned(d.to_string())),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    async fn metadata(&self) -> McpResult<ServerMetadata> {
        self.check_transport()?;
        self.fetching.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.fetching.exit();

        if self.server.starts_with("broken") {
            return Err(McpError::Transport(format!(
                "metadata unavailable on '{}'",
                self.server
            )));
        }

        Ok(ServerMetadata {
            version: format!("1.0.{}", self.id),
            description: Some(format!("{} server", self.server)),
            instructions: None,
        })
    }

    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.check_transport()?;
        Ok(vec![
            tool("echo", Some("Echo the input back")),
            tool("fail", None),
        ])
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult> {
        self.check_transport()?;
        match name {
            "echo" => {
                let text = serde_json::to_string(&arguments.unwrap_or_default())
                    .map_err(|e| McpError::Transport(e.to_string()))?;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            "fail" => Ok(CallToolResult::error(vec![Content::text("bad input")])),
            other => Err(McpError::Transport(format!("unknown tool '{}'", other))),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn config_with(servers: &[&str]) -> McpHubConfig {
    McpHubConfig::from_servers(
        servers
            .iter()
            .map(|name| McpServerConfig::stdio(*name, "mock-server", &[])),
    )
}
