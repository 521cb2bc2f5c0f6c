// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Client for one MCP server

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::protocol::{
    CallToolParams, CallToolResult, InitializeParams, JsonRpcRequest, McpOutput,
    ReadResourceParams, ReadResourceResult,
};
use super::transport::StdioTransport;
use crate::config::McpServerConfig;
use crate::error::{Result, TernError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct McpClient {
    name: String,
    transport: Mutex<StdioTransport>,
    next_id: AtomicU64,
}

impl McpClient {
    /// Start the server and complete the initialize handshake.
    pub async fn connect(name: &str, config: &McpServerConfig) -> Result<Self> {
        let client = Self {
            name: name.to_string(),
            transport: Mutex::new(StdioTransport::spawn(name, config)?),
            next_id: AtomicU64::new(1),
        };

        let params = serde_json::to_value(InitializeParams::default())?;
        let _: Value = client.request("initialize", Some(params)).await?;
        client
            .transport
            .lock()
            .await
            .send(&JsonRpcRequest::notification("notifications/initialized"))
            .await?;

        tracing::info!(target: "tern.mcp", server = %name, "connected");
        Ok(client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call_tool(&self, tool: &str, arguments: Option<Value>) -> Result<McpOutput> {
        let params = serde_json::to_value(CallToolParams {
            name: tool.to_string(),
            arguments,
        })?;
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;
        Ok(result.into())
    }

    pub async fn read_resource(&self, uri: &str) -> Result<McpOutput> {
        let params = serde_json::to_value(ReadResourceParams { uri: uri.to_string() })?;
        let result: ReadResourceResult = self.request("resources/read", Some(params)).await?;
        Ok(result.into())
    }

    pub async fn shutdown(&self) {
        self.transport.lock().await.shutdown().await;
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let mut transport = self.transport.lock().await;
        transport.send(&request).await?;

        let response = tokio::time::timeout(REQUEST_TIMEOUT, async {
            loop {
                let response = transport.recv().await?;
                // Server notifications and stale responses are not ours.
                if response.id_u64() == Some(id) {
                    return Ok::<_, TernError>(response);
                }
            }
        })
        .await
        .map_err(|_| {
            TernError::Mcp(format!(
                "Server '{}' did not answer {} within {}s",
                self.name,
                method,
                REQUEST_TIMEOUT.as_secs()
            ))
        })??;

        if let Some(error) = response.error {
            return Err(TernError::Mcp(format!(
                "{} failed on '{}': {} ({})",
                method, self.name, error.message, error.code
            )));
        }
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| TernError::Mcp(format!("Malformed {} result from '{}': {}", method, self.name, e)))
    }
}
