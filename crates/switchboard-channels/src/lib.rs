// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod adapter;
pub mod bus;
pub mod long_polling;
pub mod webhook_a;
pub mod webhook_b;
pub mod webui;

pub use adapter::{AdapterSink, ChannelAdapter};
pub use bus::{MessageBus, OutboundSink};
pub use long_polling::LongPollingAdapter;
pub use webhook_a::WebhookAAdapter;
pub use webhook_b::WebhookBAdapter;
pub use webui::WebUIAdapter;

use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
