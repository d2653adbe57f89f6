// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use switchboard_config::ProviderConfig;
use tokio::sync::Mutex;

use crate::anthropic::AnthropicClient;
use crate::openai_compat::OpenAICompatClient;
use crate::types::ChatResult;

/// Fixed system prompt used for the document pre-extraction pass,
/// independent of whatever the caller configured for the main conversation.
const DOC_EXTRACTION_SYSTEM_PROMPT: &str =
    "You are a precise document reader. Extract exactly what is asked for \
     from the attached file(s), quoting source text where relevant. Do not \
     speculate beyond what the documents contain.";

/// Fixed system prompt for compacting a conversation prefix into a summary.
const SUMMARIZE_SYSTEM_PROMPT: &str =
    "Summarize the conversation excerpt below concisely, preserving \
     important facts, decisions, and open threads. Output only the summary \
     text, with no preamble.";

const SUMMARIZE_TEMPERATURE: f32 = 0.2;
const SUMMARIZE_MAX_TOKENS: u32 = 512;

fn is_anthropic(provider_type: &str) -> bool {
    provider_type.eq_ignore_ascii_case("anthropic")
}

/// Holds the lazily-constructed wire client for whichever dialect the
/// configured provider speaks, and exposes the dialect-agnostic completion
/// operations the orchestrator needs.
///
/// The client is built on first use rather than at construction so that a
/// `Runtime` can be created cheaply (e.g. at startup, before any API key
/// validation is needed) and so that concurrent callers share one
/// `reqwest::Client` (and its connection pool) instead of each opening a
/// fresh one.
pub struct Runtime {
    config: ProviderConfig,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    openai_client: Mutex<Option<Arc<OpenAICompatClient>>>,
    anthropic_client: Mutex<Option<Arc<AnthropicClient>>>,
}

impl Runtime {
    pub fn new(
        config: ProviderConfig,
        model: String,
        api_key: Option<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            config,
            model,
            api_key,
            max_tokens,
            temperature,
            openai_client: Mutex::new(None),
            anthropic_client: Mutex::new(None),
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout)
    }

    async fn openai_client(&self) -> Arc<OpenAICompatClient> {
        let mut guard = self.openai_client.lock().await;
        if let Some(client) = guard.as_ref() {
            return client.clone();
        }
        let client = Arc::new(OpenAICompatClient::new(
            self.model.clone(),
            self.api_key.clone(),
            self.config.base_url.as_deref(),
            self.max_tokens,
            self.temperature,
            self.request_timeout(),
        ));
        *guard = Some(client.clone());
        client
    }

    async fn anthropic_client(&self) -> Arc<AnthropicClient> {
        let mut guard = self.anthropic_client.lock().await;
        if let Some(client) = guard.as_ref() {
            return client.clone();
        }
        let client = Arc::new(AnthropicClient::new(
            self.model.clone(),
            self.api_key.clone(),
            self.config.base_url.as_deref(),
            self.max_tokens,
            self.temperature,
            self.request_timeout(),
        ));
        *guard = Some(client.clone());
        client
    }

    /// A single completion turn with no tool definitions, used for the
    /// document pre-extraction pass (OpenAI-compatible providers only —
    /// Anthropic conversations never take this branch).
    pub async fn chat(
        &self,
        messages: Vec<Value>,
        system_prompt: Option<&str>,
    ) -> anyhow::Result<ChatResult> {
        if is_anthropic(&self.config.r#type) {
            self.anthropic_client()
                .await
                .chat(messages, system_prompt)
                .await
        } else {
            self.openai_client()
                .await
                .chat(messages, system_prompt, None, None)
                .await
        }
    }

    /// Summarize a conversation prefix with a dedicated low-temperature,
    /// bounded-output call, independent of the caller's configured
    /// temperature and `maxTokens`.
    pub async fn summarize(&self, messages: Vec<Value>) -> anyhow::Result<ChatResult> {
        if is_anthropic(&self.config.r#type) {
            self.anthropic_client()
                .await
                .chat_with_tools_overriding(
                    messages,
                    Vec::new(),
                    Some(SUMMARIZE_SYSTEM_PROMPT),
                    Some(SUMMARIZE_TEMPERATURE),
                    Some(SUMMARIZE_MAX_TOKENS),
                )
                .await
        } else {
            self.openai_client()
                .await
                .chat(
                    messages,
                    Some(SUMMARIZE_SYSTEM_PROMPT),
                    Some(SUMMARIZE_TEMPERATURE),
                    Some(SUMMARIZE_MAX_TOKENS),
                )
                .await
        }
    }

    /// A completion turn with tool definitions attached, dispatched to
    /// whichever dialect the configured provider speaks. `tools` must
    /// already be in the target dialect's shape — see
    /// `switchboard_tools::ToolRegistry::openai_tools`/`anthropic_tools`.
    pub async fn chat_with_tools(
        &self,
        messages: Vec<Value>,
        tools: Vec<Value>,
        system_prompt: Option<&str>,
    ) -> anyhow::Result<ChatResult> {
        if is_anthropic(&self.config.r#type) {
            self.anthropic_client()
                .await
                .chat_with_tools(messages, tools, system_prompt)
                .await
        } else {
            self.openai_client()
                .await
                .chat_with_tools(messages, tools, system_prompt)
                .await
        }
    }

    /// Ask a question against attached documents, uploading them rather
    /// than inlining their contents. OpenAI-compatible providers only.
    pub async fn respond_with_files(
        &self,
        prompt: &str,
        file_paths: &[std::path::PathBuf],
    ) -> anyhow::Result<ChatResult> {
        self.openai_client()
            .await
            .respond_with_files(prompt, file_paths, Some(DOC_EXTRACTION_SYSTEM_PROMPT))
            .await
    }

    pub fn provider_type(&self) -> &str {
        &self.config.r#type
    }

    pub fn is_anthropic(&self) -> bool {
        is_anthropic(&self.config.r#type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_detection_is_case_insensitive() {
        assert!(is_anthropic("Anthropic"));
        assert!(is_anthropic("anthropic"));
        assert!(!is_anthropic("openai"));
    }

    #[tokio::test]
    async fn openai_client_is_memoized_across_calls() {
        let runtime = Runtime::new(
            ProviderConfig {
                r#type: "openai".into(),
                api_key: None,
                base_url: None,
                request_timeout: 1000,
            },
            "gpt-4o".into(),
            None,
            4096,
            0.2,
        );
        let a = runtime.openai_client().await;
        let b = runtime.openai_client().await;
        assert!(Arc::ptr_eq(&a, &b));
    }
}
