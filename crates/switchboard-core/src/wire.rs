// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Dialect-specific message builders.
//!
//! Kept as free functions rather than methods on [`crate::Conversation`] or
//! `Runtime` so the provider runtime stays dialect-agnostic glue: it only
//! ever sees an already-shaped `Vec<serde_json::Value>`.
use serde_json::{json, Value};

use crate::content::ContentBlock;
use crate::conversation::{Conversation, TurnRecord, UserPayload};

fn openai_block(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::Image { data, media_type, .. } => json!({
            "type": "image_url",
            "image_url": {"url": format!("data:{media_type};base64,{data}")},
        }),
        ContentBlock::Document { media_type, .. } => {
            json!({"type": "text", "text": format!("[document: {media_type}]")})
        }
    }
}

fn anthropic_block(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::Image { data, media_type, .. } => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data},
        }),
        ContentBlock::Document { data, media_type, .. } => json!({
            "type": "document",
            "source": {"type": "base64", "media_type": media_type, "data": data},
        }),
    }
}

fn user_message(payload: &UserPayload, is_anthropic: bool) -> Value {
    match payload {
        UserPayload::Text(text) => json!({"role": "user", "content": text}),
        UserPayload::Blocks(blocks) => {
            let parts: Vec<Value> = blocks
                .iter()
                .map(|b| if is_anthropic { anthropic_block(b) } else { openai_block(b) })
                .collect();
            json!({"role": "user", "content": parts})
        }
    }
}

/// Render a conversation's turns into a dialect-shaped messages array.
///
/// Consecutive `Tool` turns following the same assistant tool-calling turn
/// are grouped: one `tool`-role message per call for the OpenAI dialect,
/// one `user` message containing a `tool_result` block per call for
/// Anthropic — matching each dialect's own tool-result wire shape.
pub fn build_messages(conv: &Conversation, is_anthropic: bool) -> Vec<Value> {
    let mut messages = Vec::with_capacity(conv.turns.len());
    let mut i = 0;
    while i < conv.turns.len() {
        match &conv.turns[i] {
            TurnRecord::User(payload) => {
                messages.push(user_message(payload, is_anthropic));
                i += 1;
            }
            TurnRecord::Assistant { raw, .. } => {
                messages.push(raw.clone());
                i += 1;
            }
            TurnRecord::Tool { .. } => {
                let mut group = Vec::new();
                while let Some(TurnRecord::Tool { call_id, name, content }) = conv.turns.get(i) {
                    group.push((call_id.clone(), name.clone(), content.clone()));
                    i += 1;
                }
                if is_anthropic {
                    let blocks: Vec<Value> = group
                        .iter()
                        .map(|(id, _, content)| {
                            json!({"type": "tool_result", "tool_use_id": id, "content": content})
                        })
                        .collect();
                    messages.push(json!({"role": "user", "content": blocks}));
                } else {
                    for (id, name, content) in &group {
                        messages.push(json!({
                            "role": "tool",
                            "tool_call_id": id,
                            "name": name,
                            "content": content,
                        }));
                    }
                }
            }
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_turn_becomes_bare_string_content() {
        let mut conv = Conversation::default();
        conv.push_user_text("hello");
        let messages = build_messages(&conv, false);
        assert_eq!(messages[0], json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn anthropic_image_block_matches_wire_shape() {
        let mut conv = Conversation::default();
        conv.push_user_blocks(vec![
            ContentBlock::text("describe this"),
            ContentBlock::image("AAA=", "image/png"),
        ]);
        let messages = build_messages(&conv, true);
        let content = &messages[0]["content"];
        assert_eq!(content[0], json!({"type": "text", "text": "describe this"}));
        assert_eq!(
            content[1],
            json!({"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAA="}})
        );
    }

    #[test]
    fn openai_image_block_uses_data_url() {
        let mut conv = Conversation::default();
        conv.push_user_blocks(vec![ContentBlock::image("AAA=", "image/png")]);
        let messages = build_messages(&conv, false);
        assert_eq!(
            messages[0]["content"][0],
            json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,AAA="}})
        );
    }

    #[test]
    fn openai_tool_turns_become_one_message_each() {
        let mut conv = Conversation::default();
        conv.turns.push(TurnRecord::Tool { call_id: "1".into(), name: "read_file".into(), content: "X".into() });
        conv.turns.push(TurnRecord::Tool { call_id: "2".into(), name: "read_file".into(), content: "Y".into() });
        let messages = build_messages(&conv, false);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["tool_call_id"], "1");
        assert_eq!(messages[1]["tool_call_id"], "2");
    }

    #[test]
    fn anthropic_tool_turns_group_into_one_user_message() {
        let mut conv = Conversation::default();
        conv.turns.push(TurnRecord::Tool { call_id: "1".into(), name: "read_file".into(), content: "X".into() });
        conv.turns.push(TurnRecord::Tool { call_id: "2".into(), name: "read_file".into(), content: "Y".into() });
        let messages = build_messages(&conv, true);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"].as_array().unwrap().len(), 2);
    }
}
