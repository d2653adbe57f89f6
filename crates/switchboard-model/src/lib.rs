// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod anthropic;
pub mod openai_compat;
pub mod runtime;
pub mod types;

pub use anthropic::AnthropicClient;
pub use openai_compat::OpenAICompatClient;
pub use runtime::Runtime;
pub use types::{ChatResult, ToolCallRequest, Usage};
