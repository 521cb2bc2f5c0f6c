// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! MCP transport layer - stdio of a spawned server process
//!
//! Messages are newline-delimited JSON-RPC 2.0.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::config::McpServerConfig;
use crate::error::{Result, TernError};

/// Stdio transport to one MCP server
pub struct StdioTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Spawn the configured server process.
    pub fn spawn(name: &str, config: &McpServerConfig) -> Result<Self> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TernError::Mcp(format!("Failed to start server '{}': {}", name, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TernError::Mcp(format!("Server '{}' has no stdin", name)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TernError::Mcp(format!("Server '{}' has no stdout", name)))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Write a JSON-RPC request to the server
    pub async fn send(&mut self, request: &JsonRpcRequest) -> Result<()> {
        let mut json = serde_json::to_string(request)?;
        json.push('\n');
        self.stdin.write_all(json.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read the next JSON-RPC message from the server
    ///
    /// Lines that are not JSON-RPC messages are skipped.
    pub async fn recv(&mut self) -> Result<JsonRpcResponse> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| TernError::Mcp("Server closed its output".to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(&line) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(target: "tern.mcp", error = %e, "skipping unparseable server output");
                }
            }
        }
    }

    pub async fn shutdown(&mut self) {
        let _ = self.child.kill().await;
    }
}
