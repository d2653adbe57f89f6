// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde_json::Value;
use tracing::{info, warn};

use crate::server::{MCPServer, MCPServerSpec};

/// Owns every spawned MCP server and routes tool calls to whichever one
/// advertised the tool.
///
/// Tool names are tracked in a single flat `name -> server` map built by
/// querying each server's `tools/list` once at startup. If two servers
/// declare a tool with the same name, the server started later wins; this
/// mirrors the simple last-write-wins merge the reference gateway uses
/// rather than namespacing tool names by server.
pub struct MCPManager {
    servers: HashMap<String, MCPServer>,
    tool_owner: HashMap<String, String>,
}

impl MCPManager {
    pub fn new() -> Self {
        Self {
            servers: HashMap::new(),
            tool_owner: HashMap::new(),
        }
    }

    /// Spawn every configured server and index its advertised tools. A
    /// server that fails to spawn or fails its initial `tools/list` is
    /// logged and skipped rather than aborting startup for every other
    /// server.
    pub async fn start_all(&mut self, specs: Vec<MCPServerSpec>) {
        for spec in specs {
            let name = spec.name.clone();
            match MCPServer::spawn(spec).await {
                Ok(server) => match server.list_tools().await {
                    Ok(tools) => {
                        for tool in &tools {
                            if let Some(tool_name) = tool.get("name").and_then(Value::as_str) {
                                self.tool_owner
                                    .insert(tool_name.to_string(), name.clone());
                            }
                        }
                        info!(server = %name, tool_count = tools.len(), "MCP server ready");
                        self.servers.insert(name, server);
                    }
                    Err(e) => {
                        warn!(server = %name, error = %e, "failed to list tools, dropping server");
                    }
                },
                Err(e) => {
                    warn!(server = %name, error = %e, "failed to spawn MCP server");
                }
            }
        }
    }

    /// All tool schemas across every managed server, in OpenAI function-tool
    /// shape, suitable for appending to a `ToolRegistry`'s own tool list.
    pub async fn all_tools(&self) -> Vec<Value> {
        let mut tools = Vec::new();
        for server in self.servers.values() {
            if let Ok(list) = server.list_tools().await {
                tools.extend(list);
            }
        }
        tools
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> anyhow::Result<String> {
        let Some(owner) = self.tool_owner.get(name) else {
            return Ok("tool not found".to_string());
        };
        let Some(server) = self.servers.get(owner) else {
            return Ok("tool not found".to_string());
        };
        server.call_tool(name, arguments).await
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tool_owner.contains_key(name)
    }

    pub async fn shutdown_all(&self) {
        for server in self.servers.values() {
            server.shutdown().await;
        }
    }
}

impl Default for MCPManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manager_reports_no_tools() {
        let manager = MCPManager::new();
        assert!(!manager.has_tool("anything"));
    }

    #[tokio::test]
    async fn calling_an_unmapped_tool_returns_not_found() {
        let manager = MCPManager::new();
        let result = manager.call_tool("nonexistent", serde_json::json!({})).await.unwrap();
        assert_eq!(result, "tool not found");
    }
}
