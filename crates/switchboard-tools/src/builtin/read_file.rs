// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};
use crate::workspace::resolve_path;

/// Reads a file's contents, confined to the workspace when configured to be.
pub struct ReadFileTool {
    pub workspace: PathBuf,
    pub restrict_to_workspace: bool,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "file path, relative to the workspace" }
            },
            "required": ["path"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::FileContent
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

        match tokio::fs::read_to_string(&resolved).await {
            Ok(contents) => ToolOutput::ok(&call.id, contents),
            Err(e) => ToolOutput::err(&call.id, format!("error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn call(path: &str) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: "read_file".into(),
            args: json!({ "path": path }),
        }
    }

    #[tokio::test]
    async fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("note.txt"), "hello world").unwrap();
        let tool = ReadFileTool {
            workspace: dir.path().to_path_buf(),
            restrict_to_workspace: true,
        };
        let out = tool.execute(&call("note.txt")).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "hello world");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool {
            workspace: dir.path().to_path_buf(),
            restrict_to_workspace: true,
        };
        let out = tool.execute(&call("missing.txt")).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn escape_outside_workspace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool {
            workspace: dir.path().to_path_buf(),
            restrict_to_workspace: true,
        };
        let out = tool.execute(&call("../../etc/passwd")).await;
        assert!(out.is_error);
        assert!(out.content.contains("outside workspace"));
    }

    #[tokio::test]
    async fn missing_path_argument_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool {
            workspace: dir.path().to_path_buf(),
            restrict_to_workspace: true,
        };
        let call = ToolCall {
            id: "1".into(),
            name: "read_file".into(),
            args: json!({}),
        };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }
}
