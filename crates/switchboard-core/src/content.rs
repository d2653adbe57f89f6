// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wire-agnostic message shapes shared between channel adapters, the
//! conversation store, and the provider runtime.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single piece of rich content attached to a message: an image, a
/// document, or a plain text fragment. Immutable once constructed — callers
/// build a new block rather than mutating one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        /// Base64-encoded image bytes.
        data: String,
        media_type: String,
        #[serde(default)]
        url: Option<String>,
    },
    Document {
        /// Base64-encoded document bytes.
        data: String,
        media_type: String,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        inline_text: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(data: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self::Image { data: data.into(), media_type: media_type.into(), url: None }
    }

    pub fn document(data: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self::Document { data: data.into(), media_type: media_type.into(), url: None, inline_text: None }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentBlock::Image { .. })
    }

    pub fn is_document(&self) -> bool {
        matches!(self, ContentBlock::Document { .. })
    }

    /// Classify a fetched media payload by its media type, per spec §4.2:
    /// `image/*` becomes an image block, anything else a document block.
    pub fn from_media(data: impl Into<String>, media_type: impl Into<String>) -> Self {
        let media_type = media_type.into();
        if media_type.starts_with("image/") {
            Self::image(data, media_type)
        } else {
            Self::document(data, media_type)
        }
    }
}

/// A message arriving from a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub text: String,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
}

impl InboundMessage {
    /// `<channel>:<chat_id>` — the unit of conversation continuity across
    /// every message this session ever sends or receives.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// A reply constructed by the orchestrator, consumed exactly once by the
/// outbound dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub text: String,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
}
