// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::multipart;
use serde_json::{json, Value};
use tracing::debug;

use crate::types::{ChatResult, ToolCallRequest, Usage};

/// Client for any provider that speaks the OpenAI `/chat/completions` wire
/// format: OpenAI itself, DeepSeek, MiniMax, and self-hosted/`custom`
/// endpoints that mirror it (LiteLLM, vLLM's OpenAI-compat server, etc).
pub struct OpenAICompatClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

/// Normalise a configured base URL to the provider's versioned API root.
///
/// Strips a trailing slash, then appends `/v1` unless the URL already ends
/// in `/v1`. Falls back to the OpenAI default when `base_url` is `None`.
pub fn normalize_openai_base(base_url: Option<&str>) -> String {
    let base = base_url.unwrap_or("https://api.openai.com");
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

impl OpenAICompatClient {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        request_timeout: Duration,
    ) -> Self {
        Self {
            base_url: normalize_openai_base(base_url),
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

    fn auth_header(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    /// Prepend a system message unless one is already first in `messages`.
    fn with_system_prompt(messages: Vec<Value>, system_prompt: Option<&str>) -> Vec<Value> {
        let already_has_system = messages
            .first()
            .and_then(|m| m.get("role"))
            .and_then(Value::as_str)
            == Some("system");
        match (system_prompt, already_has_system) {
            (Some(prompt), false) if !prompt.is_empty() => {
                let mut out = Vec::with_capacity(messages.len() + 1);
                out.push(json!({"role": "system", "content": prompt}));
                out.extend(messages);
                out
            }
            _ => messages,
        }
    }

    async fn post_chat_completions(&self, body: Value) -> anyhow::Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .auth_header(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context("sending chat completion request")?;
        let status = resp.status();
        let text = resp.text().await.context("reading response body")?;
        if !status.is_success() {
            bail!("openai-compatible API error ({status}): {text}");
        }
        serde_json::from_str(&text).context("parsing chat completion response")
    }

    fn parse_completion(&self, raw: Value) -> anyhow::Result<ChatResult> {
        let choice = raw
            .get("choices")
            .and_then(|c| c.get(0))
            .context("response had no choices")?;
        let message = choice.get("message").cloned().unwrap_or(json!({}));
        let text = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let tool_calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|call| {
                        let id = call.get("id")?.as_str()?.to_string();
                        let func = call.get("function")?;
                        let name = func.get("name")?.as_str()?.to_string();
                        let args_str = func.get("arguments").and_then(Value::as_str).unwrap_or("{}");
                        let arguments = serde_json::from_str(args_str).unwrap_or_else(|e| {
                            debug!(error = %e, "tool call arguments were not valid JSON, using empty object");
                            json!({})
                        });
                        Some(ToolCallRequest { id, name, arguments })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let usage = raw.get("usage").and_then(Usage::from_raw);

        Ok(ChatResult {
            text,
            tool_calls,
            usage,
            raw_message: message,
        })
    }

    /// Completion with no tool definitions. Used for the document
    /// pre-extraction pass and conversation summarization, both of which run
    /// with a fixed system prompt and override the caller's configured
    /// temperature and/or output budget.
    pub async fn chat(
        &self,
        messages: Vec<Value>,
        system_prompt: Option<&str>,
        temperature_override: Option<f32>,
        max_tokens_override: Option<u32>,
    ) -> anyhow::Result<ChatResult> {
        let messages = Self::with_system_prompt(messages, system_prompt);
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens_override.unwrap_or(self.max_tokens),
            "temperature": temperature_override.unwrap_or(self.temperature),
        });
        let raw = self.post_chat_completions(body).await?;
        self.parse_completion(raw)
    }

    /// Completion with a tool-calling round: `tools` is the full OpenAI
    /// `tools` array (`{"type": "function", "function": {...}}` entries).
    pub async fn chat_with_tools(
        &self,
        messages: Vec<Value>,
        tools: Vec<Value>,
        system_prompt: Option<&str>,
    ) -> anyhow::Result<ChatResult> {
        let messages = Self::with_system_prompt(messages, system_prompt);
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }
        let raw = self.post_chat_completions(body).await?;
        self.parse_completion(raw)
    }

    /// Upload a file for use with the `/responses` endpoint, returning its
    /// file id.
    async fn upload_file(&self, path: &std::path::Path) -> anyhow::Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());
        let part = multipart::Part::bytes(bytes).file_name(filename);
        let form = multipart::Form::new()
            .part("file", part)
            .text("purpose", "user_data");

        let url = format!("{}/files", self.base_url);
        let resp = self
            .auth_header(self.client.post(&url))
            .multipart(form)
            .send()
            .await
            .context("uploading file")?;
        let status = resp.status();
        let text = resp.text().await.context("reading upload response")?;
        if !status.is_success() {
            bail!("file upload failed ({status}): {text}");
        }
        let parsed: Value = serde_json::from_str(&text).context("parsing upload response")?;
        parsed
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("upload response had no file id")
    }

    /// Ask a question about one or more documents by uploading them and
    /// using the `/responses` endpoint's `input_file` content type, rather
    /// than inlining file contents as text.
    pub async fn respond_with_files(
        &self,
        prompt: &str,
        file_paths: &[std::path::PathBuf],
        system_prompt: Option<&str>,
    ) -> anyhow::Result<ChatResult> {
        let mut content = Vec::new();
        for path in file_paths {
            let file_id = self.upload_file(path).await?;
            content.push(json!({"type": "input_file", "file_id": file_id}));
        }
        content.push(json!({"type": "input_text", "text": prompt}));

        let mut input = Vec::new();
        if let Some(prompt) = system_prompt {
            if !prompt.is_empty() {
                input.push(json!({
                    "role": "system",
                    "content": [{"type": "input_text", "text": prompt}],
                }));
            }
        }
        input.push(json!({"role": "user", "content": content}));

        let body = json!({
            "model": self.model,
            "input": input,
        });

        let url = format!("{}/responses", self.base_url);
        let resp = self
            .auth_header(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context("sending responses request")?;
        let status = resp.status();
        let text = resp.text().await.context("reading responses body")?;
        if !status.is_success() {
            bail!("responses API error ({status}): {text}");
        }
        let raw: Value = serde_json::from_str(&text).context("parsing responses body")?;
        let usage = raw.get("usage").and_then(Usage::from_raw);
        Ok(ChatResult {
            text: extract_response_text(&raw),
            tool_calls: Vec::new(),
            usage,
            raw_message: raw,
        })
    }
}

/// Walk a `/responses` payload's `output` array looking for `output_text`
/// items nested under `message` content, concatenating every one found.
pub fn extract_response_text(raw: &Value) -> String {
    let mut out = String::new();
    let Some(output) = raw.get("output").and_then(Value::as_array) else {
        return out;
    };
    for item in output {
        let content = if item.get("type").and_then(Value::as_str) == Some("message") {
            item.get("content").and_then(Value::as_array)
        } else {
            item.get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_array)
        };
        let Some(content) = content else { continue };
        for block in content {
            if block.get("type").and_then(Value::as_str) == Some("output_text") {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_defaults_to_openai() {
        assert_eq!(normalize_openai_base(None), "https://api.openai.com/v1");
    }

    #[test]
    fn normalize_base_appends_v1() {
        assert_eq!(
            normalize_openai_base(Some("https://api.deepseek.com")),
            "https://api.deepseek.com/v1"
        );
    }

    #[test]
    fn normalize_base_strips_trailing_slash() {
        assert_eq!(
            normalize_openai_base(Some("https://api.deepseek.com/")),
            "https://api.deepseek.com/v1"
        );
    }

    #[test]
    fn normalize_base_leaves_existing_v1() {
        assert_eq!(
            normalize_openai_base(Some("http://localhost:8000/v1")),
            "http://localhost:8000/v1"
        );
    }

    #[test]
    fn with_system_prompt_prepends_when_absent() {
        let msgs = OpenAICompatClient::with_system_prompt(
            vec![json!({"role": "user", "content": "hi"})],
            Some("be helpful"),
        );
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn with_system_prompt_skips_when_already_present() {
        let msgs = OpenAICompatClient::with_system_prompt(
            vec![json!({"role": "system", "content": "existing"})],
            Some("be helpful"),
        );
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["content"], "existing");
    }

    #[test]
    fn with_system_prompt_noop_when_empty() {
        let msgs = OpenAICompatClient::with_system_prompt(
            vec![json!({"role": "user", "content": "hi"})],
            None,
        );
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn extract_response_text_walks_message_content() {
        let raw = json!({
            "output": [
                {"type": "message", "content": [{"type": "output_text", "text": "hello "}]},
                {"type": "message", "content": [{"type": "output_text", "text": "world"}]}
            ]
        });
        assert_eq!(extract_response_text(&raw), "hello world");
    }

    #[test]
    fn extract_response_text_empty_when_no_output() {
        assert_eq!(extract_response_text(&json!({})), "");
    }
}
