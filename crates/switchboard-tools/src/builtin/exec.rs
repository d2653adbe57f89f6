// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Runs a shell command with the workspace as its working directory.
///
/// Commands run through the platform shell (`sh -c` / `cmd /C`), exactly as
/// the agent composed them — there is no attempt at argument parsing or
/// sandboxing here; containment is the hook layer's job.
pub struct ExecTool {
    pub workspace: PathBuf,
    pub timeout: Duration,
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace directory"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "shell command to run" }
            },
            "required": ["command"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(Value::as_str) {
            Some(c) => c,
            None => return ToolOutput::err(&call.id, "missing required field: command"),
        };

        #[cfg(unix)]
        let mut cmd = {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        #[cfg(windows)]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        };

        cmd.current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("error: {e}")),
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&stderr);
                }
                ToolOutput::ok(&call.id, text)
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("error: {e}")),
            Err(_) => ToolOutput::err(&call.id, "command timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(command: &str) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: "exec".into(),
            args: json!({ "command": command }),
        }
    }

    #[tokio::test]
    async fn runs_command_and_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecTool {
            workspace: dir.path().to_path_buf(),
            timeout: Duration::from_secs(5),
        };
        let out = tool.execute(&call("echo hello")).await;
        assert!(!out.is_error);
        assert!(out.content.contains("hello"));
    }

    #[tokio::test]
    async fn runs_in_workspace_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecTool {
            workspace: dir.path().to_path_buf(),
            timeout: Duration::from_secs(5),
        };
        let out = tool.execute(&call("pwd")).await;
        assert!(!out.is_error);
        assert!(out.content.contains(dir.path().file_name().unwrap().to_str().unwrap()));
    }

    #[tokio::test]
    async fn times_out_long_running_commands() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecTool {
            workspace: dir.path().to_path_buf(),
            timeout: Duration::from_millis(50),
        };
        let out = tool.execute(&call("sleep 5")).await;
        assert!(out.is_error);
        assert_eq!(out.content, "command timed out");
    }

    #[tokio::test]
    async fn missing_command_argument_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecTool {
            workspace: dir.path().to_path_buf(),
            timeout: Duration::from_secs(5),
        };
        let call = ToolCall {
            id: "1".into(),
            name: "exec".into(),
            args: json!({}),
        };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }
}
