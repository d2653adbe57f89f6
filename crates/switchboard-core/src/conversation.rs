// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-session transcript storage.
//!
//! `ConversationStore` is the sole owner of every [`Conversation`] for the
//! life of the process — there is no persistence across restarts, matching
//! spec's Non-goal on cross-restart history.
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::content::ContentBlock;

/// One turn in a conversation transcript.
#[derive(Debug, Clone)]
pub enum TurnRecord {
    User(UserPayload),
    /// An assistant turn: plain text, or a list of tool calls it requested.
    /// `raw` preserves the wire dialect's own assistant-turn shape (content
    /// blocks for Anthropic, `tool_calls` array for OpenAI) so it can be
    /// replayed into the next request verbatim.
    Assistant { text: String, tool_calls: Vec<ToolCallRecord>, raw: Value },
    /// One tool result, keyed by the `tool_use`/`tool_call` id it answers.
    Tool { call_id: String, name: String, content: String },
}

#[derive(Debug, Clone)]
pub enum UserPayload {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A per-session transcript: an optional rolling summary plus the ordered
/// turns that followed it.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub summary: Option<String>,
    pub turns: Vec<TurnRecord>,
}

impl Conversation {
    /// Character-length proxy for "how much context pressure is this
    /// conversation under" — counts text content only, matching the
    /// original's char-length approximation (images/documents are not
    /// counted, since their base64 payload is not representative of token
    /// cost the way text length roughly is).
    pub fn char_length(&self) -> usize {
        let mut total = self.summary.as_deref().map(str::len).unwrap_or(0);
        for turn in &self.turns {
            total += match turn {
                TurnRecord::User(UserPayload::Text(t)) => t.len(),
                TurnRecord::User(UserPayload::Blocks(blocks)) => blocks
                    .iter()
                    .map(|b| match b {
                        ContentBlock::Text { text } => text.len(),
                        ContentBlock::Document { inline_text: Some(t), .. } => t.len(),
                        _ => 0,
                    })
                    .sum(),
                TurnRecord::Assistant { text, .. } => text.len(),
                TurnRecord::Tool { content, .. } => content.len(),
            };
        }
        total
    }

    pub fn push_user_text(&mut self, text: impl Into<String>) {
        self.turns.push(TurnRecord::User(UserPayload::Text(text.into())));
    }

    pub fn push_user_blocks(&mut self, blocks: Vec<ContentBlock>) {
        self.turns.push(TurnRecord::User(UserPayload::Blocks(blocks)));
    }

    /// Append a text block to the most recent user turn, promoting it to
    /// the blocks representation if it was plain text. Used by document
    /// pre-extraction to splice `[Document context]` notes onto the turn
    /// that triggered them.
    pub fn append_to_last_user_turn(&mut self, block: ContentBlock) {
        if let Some(TurnRecord::User(payload)) = self.turns.last_mut() {
            match payload {
                UserPayload::Blocks(blocks) => blocks.push(block),
                UserPayload::Text(text) => {
                    let mut blocks = vec![ContentBlock::text(text.clone())];
                    blocks.push(block);
                    *payload = UserPayload::Blocks(blocks);
                }
            }
        }
    }
}

/// Indexes every live [`Conversation`] by session key.
///
/// Guarded by a single `RwLock` over the whole map; individual conversation
/// mutation happens through `&mut Conversation` borrowed out under the
/// write lock for the duration of one `AgentRunner::run` call — callers are
/// expected to also hold the per-session mutex described in spec §5 so two
/// concurrent turns for the same session never interleave.
#[derive(Default)]
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the conversation for `session_key`, creating an empty
    /// one if this is the first message on this session.
    pub async fn with_conversation<R>(
        self: &Arc<Self>,
        session_key: &str,
        f: impl FnOnce(&mut Conversation) -> R,
    ) -> R {
        let mut map = self.conversations.write().await;
        let conv = map.entry(session_key.to_string()).or_default();
        f(conv)
    }

    pub async fn session_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

/// `should_compact`: true when the char-length proxy, divided by
/// `max(2000, max_tokens * 8)`, meets or exceeds `threshold`.
pub fn should_compact(conv: &Conversation, max_tokens: u32, threshold: f32) -> bool {
    let denominator = (max_tokens as usize * 8).max(2000);
    let ratio = conv.char_length() as f32 / denominator as f32;
    ratio >= threshold
}

/// Split the transcript into a compacted prefix (returned, for the caller to
/// summarize) and a retained tail of at least `preserve_count` turns (kept
/// on `conv`, minimum 1). Caller is responsible for setting `conv.summary`
/// from the returned prefix.
pub fn compact_messages(conv: &mut Conversation, preserve_count: usize) -> Vec<TurnRecord> {
    let preserve_count = preserve_count.max(1);
    if conv.turns.len() <= preserve_count {
        return Vec::new();
    }
    let split_at = conv.turns.len() - preserve_count;
    conv.turns.drain(..split_at).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv_with_n_turns(n: usize, len_each: usize) -> Conversation {
        let mut conv = Conversation::default();
        for i in 0..n {
            conv.push_user_text("x".repeat(len_each) + &i.to_string());
        }
        conv
    }

    #[test]
    fn should_compact_triggers_above_threshold() {
        // 30 messages * 400 chars = 12000 chars; denom = max(2000, 1024*8)=8192
        // ratio ~= 1.46 >= 0.8
        let conv = conv_with_n_turns(30, 400);
        assert!(should_compact(&conv, 1024, 0.8));
    }

    #[test]
    fn should_compact_false_below_threshold() {
        let conv = conv_with_n_turns(2, 10);
        assert!(!should_compact(&conv, 4096, 0.8));
    }

    #[test]
    fn compact_messages_retains_exact_preserve_count() {
        let mut conv = conv_with_n_turns(30, 400);
        let prefix = compact_messages(&mut conv, 5);
        assert_eq!(conv.turns.len(), 5);
        assert_eq!(prefix.len(), 25);
    }

    #[test]
    fn compact_messages_minimum_preserve_is_one() {
        let mut conv = conv_with_n_turns(10, 10);
        let _ = compact_messages(&mut conv, 0);
        assert_eq!(conv.turns.len(), 1);
    }

    #[test]
    fn compact_messages_noop_when_under_preserve_count() {
        let mut conv = conv_with_n_turns(3, 10);
        let prefix = compact_messages(&mut conv, 5);
        assert!(prefix.is_empty());
        assert_eq!(conv.turns.len(), 3);
    }

    #[tokio::test]
    async fn store_creates_conversation_on_first_access() {
        let store = Arc::new(ConversationStore::new());
        store.with_conversation("telegram:1", |conv| conv.push_user_text("hi")).await;
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn store_reuses_existing_conversation() {
        let store = Arc::new(ConversationStore::new());
        store.with_conversation("a", |c| c.push_user_text("1")).await;
        store.with_conversation("a", |c| c.push_user_text("2")).await;
        assert_eq!(store.session_count().await, 1);
        store
            .with_conversation("a", |c| assert_eq!(c.turns.len(), 2))
            .await;
    }

    #[test]
    fn append_to_last_user_turn_promotes_text_to_blocks() {
        let mut conv = Conversation::default();
        conv.push_user_text("hello");
        conv.append_to_last_user_turn(ContentBlock::text("[Document context] notes"));
        match conv.turns.last().unwrap() {
            TurnRecord::User(UserPayload::Blocks(blocks)) => assert_eq!(blocks.len(), 2),
            _ => panic!("expected promoted blocks"),
        }
    }
}
