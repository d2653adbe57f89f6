// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Advisory child-process hooks, fired around tool execution and at the end
//! of a conversation turn.
//!
//! Hooks never influence control flow: a hook that fails to spawn, times
//! out, or exits non-zero is logged and otherwise ignored. They exist for
//! observability and side effects (a `postToolUse` hook writing to an audit
//! log, a `stop` hook pinging a chat channel), not for veto power.
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::warn;

/// One configured hook: a shell command, an optional tool-name filter, and
/// a timeout.
#[derive(Debug, Clone)]
pub struct HookEntry {
    pub command: String,
    pub pattern: Option<regex::Regex>,
    pub timeout: Duration,
}

impl HookEntry {
    pub fn from_config(entry: &switchboard_config::HookEntry) -> Option<Self> {
        let pattern = match entry.pattern.as_deref().map(regex::Regex::new) {
            Some(Ok(re)) => Some(re),
            Some(Err(e)) => {
                warn!(pattern = %entry.pattern.as_deref().unwrap_or(""), error = %e, "invalid hook pattern, hook disabled");
                return None;
            }
            None => None,
        };
        Some(Self {
            command: entry.command.clone(),
            pattern,
            timeout: Duration::from_millis(entry.timeout),
        })
    }

    fn matches(&self, tool_name: &str) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(tool_name),
            None => true,
        }
    }
}

/// Groups the three hook lists the system recognizes: fired before a tool
/// call, after a tool call, and once at the end of every `AgentRunner::run`.
#[derive(Debug, Clone, Default)]
pub struct HookManager {
    pre_tool_use: Vec<HookEntry>,
    post_tool_use: Vec<HookEntry>,
    stop: Vec<HookEntry>,
}

impl HookManager {
    pub fn from_config(config: &switchboard_config::HooksConfig) -> Self {
        Self {
            pre_tool_use: config.pre_tool_use.iter().filter_map(HookEntry::from_config).collect(),
            post_tool_use: config.post_tool_use.iter().filter_map(HookEntry::from_config).collect(),
            stop: config.stop.iter().filter_map(HookEntry::from_config).collect(),
        }
    }

    /// Fired before a tool executes, payload `{tool, args}`.
    pub async fn run_pre_tool_use(&self, tool: &str, args: &Value) {
        let payload = serde_json::json!({"tool": tool, "args": args});
        run_matching(&self.pre_tool_use, tool, &payload).await;
    }

    /// Fired after a tool executes, payload `{tool, result}`.
    pub async fn run_post_tool_use(&self, tool: &str, result: &str) {
        let payload = serde_json::json!({"tool": tool, "result": result});
        run_matching(&self.post_tool_use, tool, &payload).await;
    }

    /// Fired once per `AgentRunner::run` call, on every return path.
    pub async fn run_stop(&self, final_text: &str) {
        let payload = serde_json::json!({"final_text": final_text});
        for hook in &self.stop {
            run_one(hook, &payload).await;
        }
    }
}

async fn run_matching(hooks: &[HookEntry], tool_name: &str, payload: &Value) {
    for hook in hooks {
        if hook.matches(tool_name) {
            run_one(hook, payload).await;
        }
    }
}

async fn run_one(hook: &HookEntry, payload: &Value) {
    let payload_str = payload.to_string();

    #[cfg(unix)]
    let mut cmd = {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&hook.command);
        c
    };
    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&hook.command);
        c
    };

    cmd.env("HOOK_PAYLOAD", &payload_str)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            warn!(command = %hook.command, error = %e, "hook failed to spawn");
            return;
        }
    };

    match tokio::time::timeout(hook.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) if !output.status.success() => {
            warn!(command = %hook.command, status = ?output.status, "hook exited non-zero");
        }
        Ok(Err(e)) => warn!(command = %hook.command, error = %e, "hook wait failed"),
        Err(_) => warn!(command = %hook.command, "hook timed out"),
        Ok(Ok(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_config::{HookEntry as ConfigHookEntry, HooksConfig};

    #[tokio::test]
    async fn runs_a_matching_pre_tool_use_hook() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("fired");
        let cfg = HooksConfig {
            pre_tool_use: vec![ConfigHookEntry {
                command: format!("touch {}", marker.display()),
                pattern: None,
                timeout: 2000,
            }],
            ..Default::default()
        };
        let manager = HookManager::from_config(&cfg);
        manager.run_pre_tool_use("exec", &serde_json::json!({})).await;
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn pattern_filters_out_non_matching_tool() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("fired");
        let cfg = HooksConfig {
            pre_tool_use: vec![ConfigHookEntry {
                command: format!("touch {}", marker.display()),
                pattern: Some("^read_file$".into()),
                timeout: 2000,
            }],
            ..Default::default()
        };
        let manager = HookManager::from_config(&cfg);
        manager.run_pre_tool_use("exec", &serde_json::json!({})).await;
        assert!(!marker.exists());
        manager.run_pre_tool_use("read_file", &serde_json::json!({})).await;
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn failing_hook_does_not_panic() {
        let cfg = HooksConfig {
            stop: vec![ConfigHookEntry {
                command: "exit 1".into(),
                pattern: None,
                timeout: 2000,
            }],
            ..Default::default()
        };
        let manager = HookManager::from_config(&cfg);
        manager.run_stop("done").await;
    }

    #[tokio::test]
    async fn slow_hook_times_out_without_panicking() {
        let cfg = HooksConfig {
            stop: vec![ConfigHookEntry {
                command: "sleep 5".into(),
                pattern: None,
                timeout: 20,
            }],
            ..Default::default()
        };
        let manager = HookManager::from_config(&cfg);
        manager.run_stop("done").await;
    }
}
