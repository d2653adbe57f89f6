// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-message orchestration: prompt assembly, the tool-calling loop, and
//! compaction.
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use serde_json::Value;
use switchboard_config::AutoCompactConfig;
use switchboard_model::Runtime;
use switchboard_tools::{Dispatcher, ToolCall};
use tokio::sync::Mutex;

use crate::content::ContentBlock;
use crate::conversation::{compact_messages, should_compact, Conversation, ConversationStore, ToolCallRecord, TurnRecord};
use crate::memory::MemoryStore;
use crate::skills::{matching_skills, Skill};
use crate::token_usage::TokenUsageJournal;
use crate::wire::build_messages;

/// Returned when the tool loop exhausts `maxToolIterations` without the
/// model settling on a plain-text reply.
pub const FALLBACK_MAX_ITERATIONS: &str = "Sorry, I reached the maximum tool iterations.";
/// Returned when any other error occurs while producing a reply.
pub const FALLBACK_GENERIC_ERROR: &str = "Sorry, I encountered an error processing your message.";

pub struct AgentRunner {
    conversations: Arc<ConversationStore>,
    runtime: Arc<Runtime>,
    dispatcher: Arc<Dispatcher>,
    memory: MemoryStore,
    skills: Vec<Skill>,
    persona_sections: Vec<String>,
    mcp_server_names: Vec<String>,
    auto_compact: AutoCompactConfig,
    max_tool_iterations: u32,
    max_tokens: u32,
    token_usage: Arc<TokenUsageJournal>,
    session_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AgentRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversations: Arc<ConversationStore>,
        runtime: Arc<Runtime>,
        dispatcher: Arc<Dispatcher>,
        memory: MemoryStore,
        skills: Vec<Skill>,
        persona_sections: Vec<String>,
        mcp_server_names: Vec<String>,
        auto_compact: AutoCompactConfig,
        max_tool_iterations: u32,
        max_tokens: u32,
        token_usage: Arc<TokenUsageJournal>,
    ) -> Self {
        Self {
            conversations,
            runtime,
            dispatcher,
            memory,
            skills,
            persona_sections,
            mcp_server_names,
            auto_compact,
            max_tool_iterations,
            max_tokens,
            token_usage,
            session_locks: DashMap::new(),
        }
    }

    fn session_lock(&self, session_key: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Orchestrates one message end-to-end. Never fails: internal errors
    /// are converted to [`FALLBACK_GENERIC_ERROR`]. The stop hook fires
    /// exactly once, on every return path, with the final text.
    pub async fn run(&self, session_key: &str, text: &str, blocks: Vec<ContentBlock>) -> String {
        let lock = self.session_lock(session_key);
        let _guard = lock.lock().await;

        let final_text = match self.run_inner(session_key, text, blocks).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(session = %session_key, error = %e, "agent run failed");
                FALLBACK_GENERIC_ERROR.to_string()
            }
        };
        self.dispatcher.hooks.run_stop(&final_text).await;
        final_text
    }

    async fn run_inner(&self, session_key: &str, text: &str, blocks: Vec<ContentBlock>) -> anyhow::Result<String> {
        let is_anthropic = self.runtime.is_anthropic();

        // Step 1 + 2: fetch/create the conversation, append the user turn.
        let doc_blocks: Vec<ContentBlock> = blocks.iter().filter(|b| b.is_document()).cloned().collect();
        self.conversations
            .with_conversation(session_key, |conv| {
                if blocks.is_empty() {
                    conv.push_user_text(text);
                } else {
                    let mut parts = Vec::with_capacity(blocks.len() + 1);
                    if !text.is_empty() {
                        parts.push(ContentBlock::text(text));
                    }
                    parts.extend(blocks);
                    conv.push_user_blocks(parts);
                }
            })
            .await;

        // Step 3: document pre-extraction, OpenAI path only.
        if !is_anthropic && !doc_blocks.is_empty() {
            self.extract_documents(session_key, text, &doc_blocks).await;
        }

        // Step 4: compaction check.
        if self.auto_compact.enabled {
            let triggered = self
                .conversations
                .with_conversation(session_key, |conv| {
                    should_compact(conv, self.max_tokens, self.auto_compact.threshold)
                })
                .await;
            if triggered {
                self.compact(session_key, is_anthropic).await;
            }
        }

        // Step 5: the tool loop.
        self.tool_loop(session_key, is_anthropic).await
    }

    async fn extract_documents(&self, session_key: &str, prompt: &str, docs: &[ContentBlock]) {
        let paths = match write_temp_documents(docs) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::debug!(error = %e, "failed to stage documents for pre-extraction");
                return;
            }
        };
        let result = self.runtime.respond_with_files(prompt, &paths).await;
        for path in &paths {
            let _ = std::fs::remove_file(path);
        }
        match result {
            Ok(chat) if !chat.text.trim().is_empty() => {
                let note = ContentBlock::text(format!("[Document context] {}", chat.text.trim()));
                self.conversations
                    .with_conversation(session_key, |conv| conv.append_to_last_user_turn(note))
                    .await;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "document pre-extraction failed, continuing without it"),
        }
    }

    async fn compact(&self, session_key: &str, is_anthropic: bool) {
        let prefix = self
            .conversations
            .with_conversation(session_key, |conv| compact_messages(conv, self.auto_compact.preserve_count))
            .await;
        if prefix.is_empty() {
            return;
        }
        let mut prefix_conv = Conversation::default();
        prefix_conv.turns = prefix;
        let messages = build_messages(&prefix_conv, is_anthropic);
        match self.runtime.summarize(messages).await {
            Ok(result) => {
                self.conversations
                    .with_conversation(session_key, |conv| conv.summary = Some(result.text))
                    .await;
            }
            Err(e) => {
                tracing::warn!(session = %session_key, error = %e, "conversation summarization failed, prefix dropped without a summary");
            }
        }
    }

    fn system_prompt(&self, summary: Option<&str>, last_user_text: &str) -> Option<String> {
        let mut sections: Vec<String> = Vec::new();
        sections.extend(self.persona_sections.iter().cloned());
        sections.extend(self.memory.system_prompt_sections());
        if !self.mcp_server_names.is_empty() {
            sections.push(format!("# Available MCP Servers\n{}", self.mcp_server_names.join(", ")));
        }
        let matched: Vec<String> = matching_skills(&self.skills, last_user_text)
            .into_iter()
            .map(|s| s.body.clone())
            .collect();
        if !matched.is_empty() {
            sections.push(matched.join("\n\n"));
        }
        if let Some(summary) = summary {
            if !summary.is_empty() {
                sections.push(summary.to_string());
            }
        }
        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n\n"))
        }
    }

    async fn tool_loop(&self, session_key: &str, is_anthropic: bool) -> anyhow::Result<String> {
        let tools = if is_anthropic {
            self.dispatcher.anthropic_tools().await
        } else {
            self.dispatcher.openai_tools().await
        };

        for _ in 0..self.max_tool_iterations.max(1) {
            let (messages, summary, last_user_text) = self
                .conversations
                .with_conversation(session_key, |conv| {
                    let last_user_text = last_user_text(conv);
                    (build_messages(conv, is_anthropic), conv.summary.clone(), last_user_text)
                })
                .await;
            let system_prompt = self.system_prompt(summary.as_deref(), &last_user_text);

            let result = if tools.is_empty() {
                self.runtime.chat(messages, system_prompt.as_deref()).await?
            } else {
                self.runtime
                    .chat_with_tools(messages, tools.clone(), system_prompt.as_deref())
                    .await?
            };

            if let Some(usage) = result.usage {
                let model = self.runtime.provider_type().to_string();
                self.token_usage
                    .record(session_key, &model, usage, now_ms())
                    .await;
            }

            if result.tool_calls.is_empty() {
                self.conversations
                    .with_conversation(session_key, |conv| {
                        conv.turns.push(TurnRecord::Assistant {
                            text: result.text.clone(),
                            tool_calls: Vec::new(),
                            raw: result.raw_message.clone(),
                        })
                    })
                    .await;
                return Ok(result.text);
            }

            let tool_calls: Vec<ToolCallRecord> = result
                .tool_calls
                .iter()
                .map(|c| ToolCallRecord { id: c.id.clone(), name: c.name.clone(), arguments: c.arguments.clone() })
                .collect();
            self.conversations
                .with_conversation(session_key, |conv| {
                    conv.turns.push(TurnRecord::Assistant {
                        text: result.text.clone(),
                        tool_calls: tool_calls.clone(),
                        raw: result.raw_message.clone(),
                    })
                })
                .await;

            for call in &result.tool_calls {
                let tool_call = ToolCall { id: call.id.clone(), name: call.name.clone(), args: call.arguments.clone() };
                let output = self.dispatcher.execute(&tool_call).await;
                self.conversations
                    .with_conversation(session_key, |conv| {
                        conv.turns.push(TurnRecord::Tool {
                            call_id: output.call_id.clone(),
                            name: call.name.clone(),
                            content: output.content.clone(),
                        })
                    })
                    .await;
            }
        }

        Ok(FALLBACK_MAX_ITERATIONS.to_string())
    }
}

fn last_user_text(conv: &Conversation) -> String {
    for turn in conv.turns.iter().rev() {
        match turn {
            TurnRecord::User(crate::conversation::UserPayload::Text(t)) => return t.clone(),
            TurnRecord::User(crate::conversation::UserPayload::Blocks(blocks)) => {
                return blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.clone()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
            }
            _ => continue,
        }
    }
    String::new()
}

fn write_temp_documents(docs: &[ContentBlock]) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(docs.len());
    for doc in docs {
        if let ContentBlock::Document { data, media_type, .. } = doc {
            let bytes = BASE64.decode(data).unwrap_or_default();
            let ext = media_type.split('/').nth(1).unwrap_or("bin");
            let path = std::env::temp_dir().join(format!("switchboard-doc-{}.{ext}", uuid::Uuid::new_v4()));
            std::fs::write(&path, bytes)?;
            paths.push(path);
        }
    }
    Ok(paths)
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
