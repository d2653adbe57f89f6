// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Combines the local [`ToolRegistry`] with an optional MCP manager and the
//! hook manager into the single call surface `AgentRunner` drives its tool
//! loop through.
//!
//! Resolution order: a local tool name always wins; only names the local
//! registry does not recognize fall through to MCP. Every call — local or
//! remote — is wrapped by `preToolUse`/`postToolUse` hooks.
use std::sync::Arc;

use serde_json::Value;
use switchboard_mcp::MCPManager;

use crate::hooks::HookManager;
use crate::registry::ToolRegistry;
use crate::tool::{ToolCall, ToolOutput};

pub struct Dispatcher {
    pub registry: Arc<ToolRegistry>,
    pub mcp: Option<Arc<MCPManager>>,
    pub hooks: HookManager,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, mcp: Option<Arc<MCPManager>>, hooks: HookManager) -> Self {
        Self { registry, mcp, hooks }
    }

    /// Tool schemas for the prompt: local tools plus every tool an MCP
    /// server advertised (already-OpenAI-shaped entries from
    /// `MCPManager::all_tools`, re-tagged in each dialect's own shape by the
    /// caller as needed). Local names take precedence on name collision.
    pub async fn openai_tools(&self) -> Vec<Value> {
        let mut tools = self.registry.openai_tools();
        if let Some(mcp) = &self.mcp {
            let local_names: std::collections::HashSet<String> = self.registry.names().into_iter().collect();
            for tool in mcp.all_tools().await {
                let name = tool.get("name").and_then(Value::as_str).unwrap_or_default();
                if local_names.contains(name) {
                    continue;
                }
                let schema = tool
                    .get("inputSchema")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({"type": "object"}));
                tools.push(serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": name,
                        "description": tool.get("description").and_then(Value::as_str).unwrap_or(""),
                        "parameters": schema,
                    }
                }));
            }
        }
        tools
    }

    pub async fn anthropic_tools(&self) -> Vec<Value> {
        let mut tools = self.registry.anthropic_tools();
        if let Some(mcp) = &self.mcp {
            let local_names: std::collections::HashSet<String> = self.registry.names().into_iter().collect();
            for tool in mcp.all_tools().await {
                let name = tool.get("name").and_then(Value::as_str).unwrap_or_default();
                if local_names.contains(name) {
                    continue;
                }
                let schema = tool
                    .get("inputSchema")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({"type": "object"}));
                tools.push(serde_json::json!({
                    "name": name,
                    "description": tool.get("description").and_then(Value::as_str).unwrap_or(""),
                    "input_schema": schema,
                }));
            }
        }
        tools
    }

    /// Resolve and run one tool call, firing hooks and never propagating an
    /// execution failure — unknown tools and thrown exceptions alike become
    /// an `"error: ..."` string the model sees in the next turn.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        self.hooks.run_pre_tool_use(&call.name, &call.args).await;

        let output = if self.registry.contains(&call.name) {
            self.registry.execute(call).await
        } else if let Some(mcp) = &self.mcp {
            match mcp.call_tool(&call.name, call.args.clone()).await {
                Ok(text) => ToolOutput::ok(&call.id, text),
                Err(e) => ToolOutput::err(&call.id, format!("error: {e}")),
            }
        } else {
            ToolOutput::err(&call.id, format!("unknown tool: {}", call.name))
        };

        self.hooks.run_post_tool_use(&call.name, &output.content).await;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use switchboard_config::HooksConfig;

    use crate::policy::ApprovalPolicy;
    use crate::tool::Tool;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn default_policy(&self) -> ApprovalPolicy {
            ApprovalPolicy::Auto
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "echoed")
        }
    }

    #[tokio::test]
    async fn local_tool_wins_and_executes() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            None,
            HookManager::from_config(&HooksConfig::default()),
        );
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({}) };
        let out = dispatcher.execute(&call).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "echoed");
    }

    #[tokio::test]
    async fn unknown_tool_with_no_mcp_is_an_error() {
        let dispatcher = Dispatcher::new(
            Arc::new(ToolRegistry::new()),
            None,
            HookManager::from_config(&HooksConfig::default()),
        );
        let call = ToolCall { id: "1".into(), name: "missing".into(), args: json!({}) };
        let out = dispatcher.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }
}
