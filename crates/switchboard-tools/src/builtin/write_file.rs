// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};
use crate::workspace::resolve_path;

/// Writes (overwriting) a text file, confined to the workspace when configured to be.
pub struct WriteFileTool {
    pub workspace: PathBuf,
    pub restrict_to_workspace: bool,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file, creating parent directories as needed"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "file path, relative to the workspace" },
                "content": { "type": "string", "description": "text content to write" }
            },
            "required": ["path", "content"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(Value::as_str) {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "missing required field: path"),
        };
        let content = match call.args.get("content").and_then(Value::as_str) {
            Some(c) => c,
            None => return ToolOutput::err(&call.id, "missing required field: content"),
        };

        let resolved = match resolve_path(&self.workspace, path, self.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.id, format!("error: {e}"));
            }
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(()) => ToolOutput::ok(&call.id, format!("wrote {} bytes", content.len())),
            Err(e) => ToolOutput::err(&call.id, format!("error: {e}")),
        }
    }
}
