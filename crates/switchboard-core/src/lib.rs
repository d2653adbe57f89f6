// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod agent_runner;
pub mod content;
pub mod conversation;
pub mod memory;
pub mod prompts;
pub mod skills;
pub mod token_usage;
pub mod wire;

pub use agent_runner::{AgentRunner, FALLBACK_GENERIC_ERROR, FALLBACK_MAX_ITERATIONS};
pub use content::{ContentBlock, InboundMessage, OutboundMessage};
pub use conversation::{compact_messages, should_compact, Conversation, ConversationStore, ToolCallRecord, TurnRecord, UserPayload};
pub use memory::MemoryStore;
pub use prompts::{load_heartbeat_prompt, load_persona_sections};
pub use skills::{load_skills, matching_skills, Skill};
pub use token_usage::TokenUsageJournal;
