// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};
use crate::workspace::resolve_path;

/// Lists the entries of a directory, confined to the workspace when configured to be.
pub struct ListDirTool {
    pub workspace: PathBuf,
    pub restrict_to_workspace: bool,
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "directory path, relative to the workspace" }
            },
            "required": ["path"]
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

        let resolved = match resolve_path(&self.workspace, path, self.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&resolved).await {
            Ok(rd) => rd,
            Err(e) => return ToolOutput::err(&call.id, format!("error: {e}")),
        };
        loop {
            match read_dir.next_entry().await {
                Ok(Some(entry)) => entries.push(entry.file_name().to_string_lossy().into_owned()),
                Ok(None) => break,
                Err(e) => return ToolOutput::err(&call.id, format!("error: {e}")),
            }
        }
        entries.sort();

        ToolOutput::ok(&call.id, json!(entries).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn call(path: &str) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: "list_dir".into(),
            args: json!({ "path": path }),
        }
    }

    #[tokio::test]
    async fn lists_entries_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        let tool = ListDirTool {
            workspace: dir.path().to_path_buf(),
            restrict_to_workspace: true,
        };
        let out = tool.execute(&call(".")).await;
        assert!(!out.is_error);
        let parsed: Vec<String> = serde_json::from_str(&out.content).unwrap();
        assert_eq!(parsed, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListDirTool {
            workspace: dir.path().to_path_buf(),
            restrict_to_workspace: true,
        };
        let out = tool.execute(&call("nope")).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn escape_outside_workspace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListDirTool {
            workspace: dir.path().to_path_buf(),
            restrict_to_workspace: true,
        };
        let out = tool.execute(&call("..")).await;
        assert!(out.is_error);
        assert!(out.content.contains("outside workspace"));
    }
}
