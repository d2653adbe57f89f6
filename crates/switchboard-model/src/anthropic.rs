// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use anyhow::{bail, Context};
use serde_json::{json, Value};

use crate::types::{ChatResult, ToolCallRequest, Usage};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API (`/v1/messages`).
///
/// Anthropic's wire format differs from the OpenAI family in three ways
/// this client has to bridge: the system prompt is a dedicated top-level
/// field rather than a message, tool calls arrive as `tool_use` content
/// blocks mixed into the assistant turn rather than a separate
/// `tool_calls` array, and authentication uses `x-api-key` rather than a
/// bearer token.
pub struct AnthropicClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        request_timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.anthropic.com".into()),
            api_key,
            model,
            max_tokens,
            temperature,
            client: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn post_messages(&self, body: Value) -> anyhow::Result<Value> {
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .context("anthropic API key not set")?;

        let url = format!("{}/v1/messages", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("sending anthropic messages request")?;
        let status = resp.status();
        let text = resp.text().await.context("reading anthropic response body")?;
        if !status.is_success() {
            bail!("anthropic API error ({status}): {text}");
        }
        serde_json::from_str(&text).context("parsing anthropic response")
    }

    fn parse_message(&self, raw: Value) -> ChatResult {
        let content = raw
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in &content {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(Value::as_str) {
                        text.push_str(t);
                    }
                }
                Some("tool_use") => {
                    if let (Some(id), Some(name)) = (
                        block.get("id").and_then(Value::as_str),
                        block.get("name").and_then(Value::as_str),
                    ) {
                        let arguments = block.get("input").cloned().unwrap_or(json!({}));
                        tool_calls.push(ToolCallRequest {
                            id: id.to_string(),
                            name: name.to_string(),
                            arguments,
                        });
                    }
                }
                _ => {}
            }
        }

        let usage = raw.get("usage").and_then(Usage::from_raw);

        ChatResult {
            text,
            tool_calls,
            usage,
            raw_message: json!({"role": "assistant", "content": content}),
        }
    }

    pub async fn chat(
        &self,
        messages: Vec<Value>,
        system_prompt: Option<&str>,
    ) -> anyhow::Result<ChatResult> {
        self.chat_with_tools_overriding(messages, Vec::new(), system_prompt, None, None)
            .await
    }

    /// `tools` is the Anthropic tool-use array
    /// (`{"name", "description", "input_schema"}` entries).
    pub async fn chat_with_tools(
        &self,
        messages: Vec<Value>,
        tools: Vec<Value>,
        system_prompt: Option<&str>,
    ) -> anyhow::Result<ChatResult> {
        self.chat_with_tools_overriding(messages, tools, system_prompt, None, None)
            .await
    }

    /// Like [`Self::chat_with_tools`], additionally overriding temperature
    /// and/or the output token budget — used for conversation summarization
    /// and other fixed-parameter internal calls.
    pub async fn chat_with_tools_overriding(
        &self,
        messages: Vec<Value>,
        tools: Vec<Value>,
        system_prompt: Option<&str>,
        temperature_override: Option<f32>,
        max_tokens_override: Option<u32>,
    ) -> anyhow::Result<ChatResult> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens_override.unwrap_or(self.max_tokens),
            "temperature": temperature_override.unwrap_or(self.temperature),
        });
        if let Some(prompt) = system_prompt {
            if !prompt.is_empty() {
                body["system"] = json!(prompt);
            }
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        let raw = self.post_messages(body).await?;
        Ok(self.parse_message(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AnthropicClient {
        AnthropicClient::new(
            "claude-test".into(),
            Some("sk-ant-test".into()),
            None,
            4096,
            0.2,
            Duration::from_secs(30),
        )
    }

    #[test]
    fn base_url_defaults_to_anthropic() {
        let c = client();
        assert_eq!(c.base_url, "https://api.anthropic.com");
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let c = AnthropicClient::new(
            "m".into(),
            None,
            Some("https://proxy.example.com/"),
            4096,
            0.2,
            Duration::from_secs(30),
        );
        assert_eq!(c.base_url, "https://proxy.example.com");
    }

    #[test]
    fn parse_message_extracts_text_blocks() {
        let c = client();
        let raw = json!({
            "content": [
                {"type": "text", "text": "hello "},
                {"type": "text", "text": "world"}
            ],
            "usage": {"input_tokens": 5, "output_tokens": 2}
        });
        let result = c.parse_message(raw);
        assert_eq!(result.text, "hello world");
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn parse_message_extracts_tool_use_blocks() {
        let c = client();
        let raw = json!({
            "content": [
                {"type": "text", "text": "let me check"},
                {"type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {"path": "a.txt"}}
            ]
        });
        let result = c.parse_message(raw);
        assert_eq!(result.text, "let me check");
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "read_file");
        assert_eq!(result.tool_calls[0].id, "toolu_1");
    }

    #[test]
    fn parse_message_tool_use_missing_fields_skipped() {
        let c = client();
        let raw = json!({ "content": [{"type": "tool_use", "name": "x"}] });
        let result = c.parse_message(raw);
        assert!(result.tool_calls.is_empty());
    }
}
