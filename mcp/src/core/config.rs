//! Hub configuration types.
//!
//! Configuration is a mapping from server name to either a stdio command or a
//! streamable HTTP URL, plus pool and dispatch tuning. YAML and JSON files are both
//! accepted (JSON parses as YAML).

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    time::Duration,
};

pub use rmcp::model::{CallToolResult, JsonObject, Tool};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{McpError, McpResult};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct McpHubConfig {
    /// Downstream MCP servers, keyed by name
    #[serde(alias = "mcpServers")]
    pub servers: BTreeMap<String, McpServerConfig>,

    /// Connection pool settings
    #[serde(default)]
    pub pool: McpPoolConfig,

    /// Request dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// One downstream server. Exactly one of `command` or `url` must be set.
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct McpServerConfig {
    /// Filled from the map key when the config is loaded
    #[serde(skip)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra environment for the child process
    #[serde(default, alias = "envs", skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// How a server is reached, derived from which fields are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Streamable,
}

impl McpServerConfig {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            command: Some(command.into()),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn streamable(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn transport_kind(&self) -> McpResult<TransportKind> {
        match (&self.command, &self.url) {
            (Some(_), None) => Ok(TransportKind::Stdio),
            (None, Some(_)) => Ok(TransportKind::Streamable),
            (Some(_), Some(_)) => Err(self.invalid("both 'command' and 'url' are set")),
            (None, None) => Err(self.invalid("one of 'command' or 'url' is required")),
        }
    }

    /// Checks the shape and values of this entry.
    pub fn validate(&self) -> McpResult<()> {
        match self.transport_kind()? {
            TransportKind::Stdio => {
                let command = self.command.as_deref().unwrap_or_default();
                if command.trim().is_empty() {
                    return Err(self.invalid("'command' must not be empty"));
                }
            }
            TransportKind::Streamable => {
                let raw = self.url.as_deref().unwrap_or_default();
                let url = Url::parse(raw)
                    .map_err(|e| self.invalid(format!("invalid url '{}': {}", raw, e)))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(self.invalid(format!(
                        "unsupported url scheme '{}', expected http or https",
                        url.scheme()
                    )));
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> McpError {
        McpError::InvalidServerConfig {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Env values may hold secrets for the child process.
        f.debug_struct("McpServerConfig")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &format!("{} vars", self.env.len()))
            .field("url", &self.url)
            .finish()
    }
}

/// Connection pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpPoolConfig {
    /// Reconnect attempts allowed since the last successful connection
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnect attempt (milliseconds)
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Factor applied to the delay for each further attempt
    #[serde(default = "default_reconnect_backoff_multiplier")]
    pub reconnect_backoff_multiplier: u32,

    /// Upper bound for a single reconnect delay (milliseconds)
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Bound on a single connect attempt. Unset waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

impl McpPoolConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Max servers queried at once by `list_servers`
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Fail the whole `list_servers` call on the first server error instead of
    /// reporting the error on that server's entry
    #[serde(default)]
    pub fail_fast: bool,
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_backoff_multiplier() -> u32 {
    2
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_max_concurrent_fetches() -> usize {
    5
}

impl Default for McpPoolConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_backoff_multiplier: default_reconnect_backoff_multiplier(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            connect_timeout_secs: None,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fail_fast: false,
        }
    }
}

impl McpHubConfig {
    /// Load and validate configuration from a YAML or JSON file
    pub async fn from_file(path: &str) -> McpResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| McpError::Config(format!("failed to read '{}': {}", path, e)))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> McpResult<Self> {
        let mut config: Self = serde_yaml::from_str(content)
            .map_err(|e| McpError::Config(format!("failed to parse config: {}", e)))?;
        for (name, server) in config.servers.iter_mut() {
            server.name = name.clone();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_servers(servers: impl IntoIterator<Item = McpServerConfig>) -> Self {
        Self {
            servers: servers.into_iter().map(|s| (s.name.clone(), s)).collect(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> McpResult<()> {
        if self.servers.is_empty() {
            return Err(McpError::Config("no servers configured".to_string()));
        }
        for server in self.servers.values() {
            if server.name.trim().is_empty() {
                return Err(McpError::Config("server name must not be empty".to_string()));
            }
            server
                .validate()
                .map_err(|e| McpError::Config(e.to_string()))?;
        }
        if self.dispatch.max_concurrent_fetches == 0 {
            return Err(McpError::Config(
                "dispatch.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.pool.reconnect_backoff_multiplier == 0 {
            return Err(McpError::Config(
                "pool.reconnect_backoff_multiplier must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
