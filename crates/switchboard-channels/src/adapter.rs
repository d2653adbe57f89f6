// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Common contract every channel adapter implements.

/// A transport that bridges an external chat platform to the `MessageBus`.
///
/// `start` begins whatever background work the adapter needs (a polling
/// loop, or nothing at all for webhook-driven adapters whose work happens
/// on incoming HTTP requests) and must return once that work is running,
/// not once it finishes. `stop` requests shutdown; adapters with no
/// background task may treat it as a no-op.
#[async_trait::async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Takes `Arc<Self>` rather than `&self` so polling adapters can clone
    /// a handle into the spawned background task.
    async fn start(self: std::sync::Arc<Self>) -> anyhow::Result<()>;

    async fn stop(&self);

    /// Deliver an outbound message. Implementors of `start`-only adapters
    /// (webhook/web UI) register an `OutboundSink` with the bus instead and
    /// may leave this as a thin forward.
    async fn send(&self, message: switchboard_core::OutboundMessage) -> anyhow::Result<()>;

    /// Whether `chat_id` is permitted to interact with this channel, per
    /// its configured allow-list. An empty allow-list means "allow all".
    fn is_allowed(&self, chat_id: &str) -> bool;
}

/// Bridges a `ChannelAdapter` into the bus's `OutboundSink` registry, for
/// adapters (long-polling, the two webhooks) whose `send` is a direct call
/// rather than a fan-out over connected clients.
pub struct AdapterSink<T: ChannelAdapter>(pub std::sync::Arc<T>);

#[async_trait::async_trait]
impl<T: ChannelAdapter> crate::bus::OutboundSink for AdapterSink<T> {
    async fn deliver(&self, message: switchboard_core::OutboundMessage) {
        if let Err(e) = self.0.send(message).await {
            tracing::warn!(channel = self.0.name(), "outbound send failed: {e}");
        }
    }
}
