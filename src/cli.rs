use clap::{Parser, ValueEnum};

/// How the hub exposes its own MCP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
    /// Streamable HTTP on `--host:--port` under `--http-path`
    Http,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-hub", version, about = "One MCP endpoint in front of many MCP servers")]
pub struct Cli {
    /// Path to the YAML or JSON server configuration
    #[arg(short, long, env = "MCP_HUB_CONFIG")]
    pub config: String,

    #[arg(long, value_enum, default_value_t = Transport::Stdio, env = "MCP_HUB_TRANSPORT")]
    pub transport: Transport,

    #[arg(long, default_value = "127.0.0.1", env = "MCP_HUB_HOST")]
    pub host: String,

    #[arg(long, default_value_t = 8000, env = "MCP_HUB_PORT")]
    pub port: u16,

    /// Mount point of the streamable HTTP endpoint
    #[arg(long, default_value = "/mcp", value_parser = parse_http_path)]
    pub http_path: String,

    /// Log filter directives, e.g. `info` or `hub_mcp=debug`. `RUST_LOG` wins when set.
    #[arg(long, default_value = "info", env = "MCP_HUB_LOG_LEVEL")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "MCP_HUB_LOG_JSON")]
    pub log_json: bool,
}

fn parse_http_path(value: &str) -> Result<String, String> {
    if !value.starts_with('/') || value.len() < 2 {
        return Err(format!(
            "'{}' must start with '/' and name a sub-path, e.g. /mcp",
            value
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["mcp-hub", "--config", "hub.yaml"]).unwrap();
        assert_eq!(cli.config, "hub.yaml");
        assert_eq!(cli.transport, Transport::Stdio);
        assert_eq!(cli.port, 8000);
        assert_eq!(cli.http_path, "/mcp");
    }

    #[test]
    fn test_http_transport() {
        let cli = Cli::try_parse_from([
            "mcp-hub",
            "-c",
            "hub.json",
            "--transport",
            "http",
            "--host",
            "0.0.0.0",
            "--port",
            "9100",
            "--http-path",
            "/hub/",
            "--log-json",
        ])
        .unwrap();
        assert_eq!(cli.transport, Transport::Http);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.port, 9100);
        assert_eq!(cli.http_path, "/hub");
        assert!(cli.log_json);
    }

    #[test]
    fn test_rejects_root_http_path() {
        assert!(parse_http_path("/").is_err());
        assert!(parse_http_path("mcp").is_err());
        assert_eq!(parse_http_path("/mcp").unwrap(), "/mcp");
    }
}
