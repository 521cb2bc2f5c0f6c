// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model Context Protocol (MCP) client
//!
//! Calls tools and reads resources on configured stdio servers. Servers are
//! started on first use and kept until [`McpHub::shutdown`].

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::McpClient;
pub use protocol::{McpOutput, PROTOCOL_VERSION};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::McpConfig;
use crate::error::{Result, TernError};

/// Access to external tool servers
#[async_trait]
pub trait McpHub: Send + Sync {
    async fn call_tool(&self, server: &str, tool: &str, arguments: Option<Value>) -> Result<McpOutput>;

    async fn read_resource(&self, server: &str, uri: &str) -> Result<McpOutput>;

    /// Stop every running server
    async fn shutdown(&self);
}

/// Hub over the servers in [`McpConfig`]
pub struct StdioMcpHub {
    config: McpConfig,
    clients: Mutex<HashMap<String, Arc<McpClient>>>,
}

impl StdioMcpHub {
    pub fn new(config: McpConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, server: &str) -> Result<Arc<McpClient>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(server) {
            return Ok(Arc::clone(client));
        }
        let config = self
            .config
            .servers
            .get(server)
            .ok_or_else(|| TernError::Mcp(format!("No MCP server named '{}' is configured", server)))?;
        if config.disabled {
            return Err(TernError::Mcp(format!("MCP server '{}' is disabled", server)));
        }
        let client = Arc::new(McpClient::connect(server, config).await?);
        clients.insert(server.to_string(), Arc::clone(&client));
        Ok(client)
    }
}

#[async_trait]
impl McpHub for StdioMcpHub {
    async fn call_tool(&self, server: &str, tool: &str, arguments: Option<Value>) -> Result<McpOutput> {
        tracing::debug!(target: "tern.mcp", server = %server, tool = %tool, "calling tool");
        self.client(server).await?.call_tool(tool, arguments).await
    }

    async fn read_resource(&self, server: &str, uri: &str) -> Result<McpOutput> {
        tracing::debug!(target: "tern.mcp", server = %server, uri = %uri, "reading resource");
        self.client(server).await?.read_resource(uri).await
    }

    async fn shutdown(&self) {
        let clients: Vec<_> = self.clients.lock().await.drain().collect();
        for (name, client) in clients {
            client.shutdown().await;
            tracing::debug!(target: "tern.mcp", server = %name, "stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpServerConfig;

    // Answers by request id; emits a notification before each tool result.
    const FAKE_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","method":"notifications/progress"}\n'
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"weather: sunny"}]}}\n' "$id" ;;
    *'"method":"resources/read"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"contents":[{"uri":"mem://notes","text":"remember the milk"}]}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id" ;;
  esac
done
"#;

    fn hub(disabled: bool) -> StdioMcpHub {
        let mut config = McpConfig::default();
        config.servers.insert(
            "fake".to_string(),
            McpServerConfig {
                command: "sh".to_string(),
                args: vec!["-c".to_string(), FAKE_SERVER.to_string()],
                env: HashMap::new(),
                auto_approve: Vec::new(),
                disabled,
            },
        );
        StdioMcpHub::new(config)
    }

    #[tokio::test]
    async fn test_call_tool_round_trip() {
        let hub = hub(false);
        let output = hub
            .call_tool("fake", "get_weather", Some(serde_json::json!({"city": "Oslo"})))
            .await
            .unwrap();
        assert_eq!(output.text, "weather: sunny");
        assert!(!output.is_error);

        let resource = hub.read_resource("fake", "mem://notes").await.unwrap();
        assert_eq!(resource.text, "remember the milk");
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_server() {
        let err = hub(false).call_tool("missing", "x", None).await.unwrap_err();
        assert!(err.to_string().contains("No MCP server named 'missing'"));
    }

    #[tokio::test]
    async fn test_disabled_server() {
        let err = hub(true).call_tool("fake", "x", None).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
