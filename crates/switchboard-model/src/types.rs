// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

/// Token accounting for a single completion, normalised across dialects.
///
/// OpenAI-compatible APIs report `prompt_tokens`/`completion_tokens`;
/// Anthropic reports `input_tokens`/`output_tokens`. Both land here under
/// the same field names so callers never branch on provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Build from whichever pair of keys is present in a raw API usage
    /// object. Returns `None` if neither pair yields a positive total —
    /// a usage block with all-zero counts is treated as absent.
    pub fn from_raw(raw: &Value) -> Option<Self> {
        let prompt = raw
            .get("prompt_tokens")
            .or_else(|| raw.get("input_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        let completion = raw
            .get("completion_tokens")
            .or_else(|| raw.get("output_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        let total = prompt + completion;
        if total == 0 {
            return None;
        }
        Some(Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        })
    }
}

/// A single tool invocation requested by the model mid-completion.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Outcome of a single completion call, dialect-normalised.
#[derive(Debug, Clone)]
pub struct ChatResult {
    /// Concatenated plain-text portion of the response.
    pub text: String,
    /// Tool calls the model asked to make, empty when none were requested.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Normalised token usage, when the API reported any.
    pub usage: Option<Usage>,
    /// The assistant turn in the wire dialect's own shape, ready to append
    /// to conversation history verbatim (tool_calls / content blocks and
    /// all) without the caller re-deriving it from `text` and `tool_calls`.
    pub raw_message: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn usage_from_openai_keys() {
        let u = Usage::from_raw(&json!({"prompt_tokens": 10, "completion_tokens": 5})).unwrap();
        assert_eq!(u.prompt_tokens, 10);
        assert_eq!(u.completion_tokens, 5);
        assert_eq!(u.total_tokens, 15);
    }

    #[test]
    fn usage_from_anthropic_keys() {
        let u = Usage::from_raw(&json!({"input_tokens": 7, "output_tokens": 3})).unwrap();
        assert_eq!(u.total_tokens, 10);
    }

    #[test]
    fn usage_all_zero_is_none() {
        assert!(Usage::from_raw(&json!({"prompt_tokens": 0, "completion_tokens": 0})).is_none());
    }

    #[test]
    fn usage_missing_keys_is_none() {
        assert!(Usage::from_raw(&json!({})).is_none());
    }
}
