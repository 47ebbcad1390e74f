//! Hub client handler for downstream MCP server notifications.
//!
//! Implements RMCP's `ClientHandler` trait. The hub does not act on notifications;
//! it surfaces them through `tracing` tagged with the server they came from.

use std::sync::Arc;

use rmcp::{
    model::{
        CancelledNotificationParam, ClientInfo, LoggingLevel, LoggingMessageNotificationParam,
        ProgressNotificationParam,
    },
    service::NotificationContext,
    ClientHandler, RoleClient,
};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct HubClientHandler {
    server_name: Arc<str>,
    client_info: ClientInfo,
}

impl HubClientHandler {
    pub fn new(server_name: impl AsRef<str>) -> Self {
        let mut client_info = ClientInfo::default();
        client_info.client_info.name = "mcp-hub".to_string();
        client_info.client_info.version = env!("CARGO_PKG_VERSION").to_string();

        Self {
            server_name: Arc::from(server_name.as_ref()),
            client_info,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

impl ClientHandler for HubClientHandler {
    async fn on_cancelled(
        &self,
        params: CancelledNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        info!(
            server = %self.server_name,
            request_id = %params.request_id,
            reason = ?params.reason,
            "MCP server cancelled request"
        );
    }

    async fn on_progress(
        &self,
        params: ProgressNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        debug!(
            server = %self.server_name,
            token = ?params.progress_token,
            progress = %params.progress,
            total = ?params.total,
            "MCP server progress"
        );
    }

    async fn on_tool_list_changed(&self, _context: NotificationContext<RoleClient>) {
        // Tool lists are fetched per request, so there is no cache to refresh.
        info!(server = %self.server_name, "MCP server tool list changed");
    }

    fn get_info(&self) -> ClientInfo {
        self.client_info.clone()
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let logger = params.logger.as_deref().unwrap_or("mcp");

        match params.level {
            LoggingLevel::Emergency
            | LoggingLevel::Alert
            | LoggingLevel::Critical
            | LoggingLevel::Error => {
                error!(server = %self.server_name, logger = %logger, level = ?params.level, "MCP: {}", params.data);
            }
            LoggingLevel::Warning => {
                warn!(server = %self.server_name, logger = %logger, "MCP: {}", params.data);
            }
            LoggingLevel::Notice | LoggingLevel::Info => {
                info!(server = %self.server_name, logger = %logger, "MCP: {}", params.data);
            }
            LoggingLevel::Debug => {
                debug!(server = %self.server_name, logger = %logger, "MCP: {}", params.data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_creation() {
        let handler = HubClientHandler::new("test-server");
        assert_eq!(handler.server_name(), "test-server");
    }

    #[test]
    fn test_client_info() {
        let handler = HubClientHandler::new("test-server");
        let info = handler.get_info();
        assert_eq!(info.client_info.name, "mcp-hub");
        assert_eq!(info.client_info.version, env!("CARGO_PKG_VERSION"));
    }
}
