// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_agent_workspace() -> String {
    ".".into()
}
fn default_agent_model() -> String {
    "gpt-4o".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_concurrency() -> u32 {
    4
}
fn default_max_tool_iterations() -> u32 {
    8
}

/// Top-level configuration document.
///
/// Deserialised from a single JSON file; every section has a
/// `#[serde(default)]` fallback so a config containing only the fields the
/// user cares about is always valid. The wire format is camelCase
/// (`maxToolIterations`, not `max_tool_iterations`); [`crate::load`]
/// additionally remaps a handful of legacy top-level section names before
/// this struct ever sees the document (see `loader::remap_legacy_keys`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default, rename = "autoCompact")]
    pub auto_compact: AutoCompactConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub mcp: MCPConfig,
    #[serde(default, rename = "tokenTracking")]
    pub token_tracking: TokenTrackingConfig,
}

impl Config {
    /// Rejects configurations that would fail at the first provider call
    /// rather than at startup. `deepseek` and `minimax` have no default
    /// base URL the way `openai`/`anthropic` do, so a missing one here is a
    /// startup-time mistake, not a runtime surprise.
    pub fn validate(&self) -> anyhow::Result<()> {
        let provider_type = self.provider.r#type.to_lowercase();
        if matches!(provider_type.as_str(), "deepseek" | "minimax") {
            let base_url = self.provider.base_url.as_deref().unwrap_or("");
            if base_url.trim().is_empty() {
                anyhow::bail!(
                    "provider.baseUrl is required when provider.type is \"{}\"",
                    self.provider.r#type
                );
            }
        }
        Ok(())
    }
}

/// LLM provider wire dialect and connection details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// "openai" | "anthropic" | "deepseek" | "minimax" | "custom"
    #[serde(default = "ProviderConfig::default_type")]
    pub r#type: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default = "ProviderConfig::default_request_timeout")]
    pub request_timeout: u64,
}

impl ProviderConfig {
    fn default_type() -> String {
        "openai".into()
    }
    fn default_request_timeout() -> u64 {
        60_000
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            r#type: Self::default_type(),
            api_key: None,
            base_url: None,
            request_timeout: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default = "default_agent_workspace")]
    pub workspace: String,
    #[serde(default = "default_agent_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workspace: default_agent_workspace(),
            model: default_agent_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_concurrency: default_max_concurrency(),
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

fn default_exec_timeout() -> u64 {
    60_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    /// Timeout in milliseconds for the `exec` tool.
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout: u64,
    #[serde(default = "default_true")]
    pub restrict_to_workspace: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            exec_timeout: default_exec_timeout(),
            restrict_to_workspace: true,
        }
    }
}

fn default_compact_threshold() -> f32 {
    0.8
}
fn default_preserve_count() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCompactConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fraction of the char-length budget at which compaction triggers.
    #[serde(default = "default_compact_threshold")]
    pub threshold: f32,
    /// Number of trailing messages kept verbatim when compacting.
    #[serde(default = "default_preserve_count")]
    pub preserve_count: usize,
}

impl Default for AutoCompactConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_compact_threshold(),
            preserve_count: default_preserve_count(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookEntry {
    pub command: String,
    #[serde(default)]
    pub pattern: Option<String>,
    /// Timeout in milliseconds.
    #[serde(default = "HookEntry::default_timeout")]
    pub timeout: u64,
}

impl HookEntry {
    fn default_timeout() -> u64 {
        5_000
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksConfig {
    #[serde(default)]
    pub pre_tool_use: Vec<HookEntry>,
    #[serde(default)]
    pub post_tool_use: Vec<HookEntry>,
    #[serde(default)]
    pub stop: Vec<HookEntry>,
}

fn default_skills_dir() -> String {
    "skills".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_skills_dir")]
    pub dir: String,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_skills_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeishuConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub app_secret: Option<String>,
    #[serde(default)]
    pub verification_token: Option<String>,
    #[serde(default)]
    pub encrypt_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub signing_secret: Option<String>,
}

fn default_webui_path() -> String {
    "/ui".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebUIConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_webui_path")]
    pub path: String,
    /// Client tokens allowed to connect. Empty means "allow all" unless a
    /// client supplies no token at all, which is always refused once this
    /// list is non-empty.
    #[serde(default)]
    pub allowed_tokens: Vec<String>,
}

impl Default for WebUIConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_webui_path(),
            allowed_tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub feishu: FeishuConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub webui: WebUIConfig,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}
fn default_gateway_port() -> u16 {
    8787
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub hmac_secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            hmac_secret: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MCPServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MCPConfig {
    #[serde(default)]
    pub servers: Vec<MCPServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTrackingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "TokenTrackingConfig::default_path")]
    pub path: String,
}

impl TokenTrackingConfig {
    fn default_path() -> String {
        "usage.jsonl".into()
    }
}

impl Default for TokenTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Self::default_path(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_provider_type_is_openai() {
        assert_eq!(Config::default().provider.r#type, "openai");
    }

    #[test]
    fn config_default_agent_max_tool_iterations_is_eight() {
        assert_eq!(Config::default().agent.max_tool_iterations, 8);
    }

    #[test]
    fn config_default_tools_restrict_to_workspace_is_true() {
        assert!(Config::default().tools.restrict_to_workspace);
    }

    #[test]
    fn config_default_auto_compact_enabled() {
        let c = Config::default();
        assert!(c.auto_compact.enabled);
        assert_eq!(c.auto_compact.preserve_count, 5);
    }

    #[test]
    fn config_default_gateway_port() {
        assert_eq!(Config::default().gateway.port, 8787);
    }

    #[test]
    fn config_deserialises_partial_json_camelcase() {
        let json = r#"{"provider": {"type": "anthropic", "apiKey": "sk-x"}}"#;
        let c: Config = serde_json::from_str(json).unwrap();
        assert_eq!(c.provider.r#type, "anthropic");
        assert_eq!(c.provider.api_key.as_deref(), Some("sk-x"));
        assert_eq!(
            c.agent.max_tool_iterations, 8,
            "unrelated sections keep defaults"
        );
    }

    #[test]
    fn config_round_trips_through_json() {
        let c = Config::default();
        let s = serde_json::to_string(&c).unwrap();
        let back: Config = serde_json::from_str(&s).unwrap();
        assert_eq!(back.provider.r#type, c.provider.r#type);
    }

    #[test]
    fn hook_entry_default_timeout_is_five_seconds() {
        let h: HookEntry = serde_json::from_str(r#"{"command": "echo hi"}"#).unwrap();
        assert_eq!(h.timeout, 5_000);
    }

    #[test]
    fn hooks_config_camelcase_keys() {
        let json = r#"{"preToolUse": [{"command": "echo pre"}]}"#;
        let h: HooksConfig = serde_json::from_str(json).unwrap();
        assert_eq!(h.pre_tool_use.len(), 1);
    }

    #[test]
    fn mcp_servers_default_to_empty() {
        assert!(Config::default().mcp.servers.is_empty());
    }

    #[test]
    fn validate_rejects_deepseek_without_base_url() {
        let mut c = Config::default();
        c.provider.r#type = "deepseek".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_minimax_with_blank_base_url() {
        let mut c = Config::default();
        c.provider.r#type = "MiniMax".into();
        c.provider.base_url = Some("   ".into());
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_accepts_deepseek_with_base_url() {
        let mut c = Config::default();
        c.provider.r#type = "deepseek".into();
        c.provider.base_url = Some("https://api.deepseek.com".into());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn validate_ignores_base_url_for_openai() {
        let c = Config::default();
        assert!(c.validate().is_ok());
    }
}
