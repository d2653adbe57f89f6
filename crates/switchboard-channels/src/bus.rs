// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Bounded inbound/outbound queues and per-channel outbound fan-out.
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use switchboard_core::OutboundMessage;
use tokio::sync::mpsc;

const QUEUE_CAPACITY: usize = 100;
const DISPATCH_POLL: Duration = Duration::from_millis(500);

/// Registered per-channel sink: receives every `OutboundMessage` addressed
/// to that channel, in the order `MessageBus::send` was called.
#[async_trait::async_trait]
pub trait OutboundSink: Send + Sync {
    async fn deliver(&self, message: OutboundMessage);
}

/// Bounded queues connecting channel adapters to the agent orchestrator.
///
/// Adapters push `InboundMessage`s via `inbound_tx` (cloned out of
/// `MessageBus::inbound_sender`) and receive replies by registering an
/// `OutboundSink` under their channel name. The bus itself only knows about
/// outbound routing — inbound consumption belongs to whatever drains
/// `inbound_rx`.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<switchboard_core::InboundMessage>,
    inbound_rx: tokio::sync::Mutex<Option<mpsc::Receiver<switchboard_core::InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: tokio::sync::Mutex<Option<mpsc::Receiver<OutboundMessage>>>,
    sinks: DashMap<String, Arc<dyn OutboundSink>>,
}

impl MessageBus {
    pub fn new() -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        Arc::new(Self {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(Some(inbound_rx)),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(Some(outbound_rx)),
            sinks: DashMap::new(),
        })
    }

    pub fn inbound_sender(&self) -> mpsc::Sender<switchboard_core::InboundMessage> {
        self.inbound_tx.clone()
    }

    pub fn outbound_sender(&self) -> mpsc::Sender<OutboundMessage> {
        self.outbound_tx.clone()
    }

    /// Takes ownership of the inbound receiver. Callable exactly once;
    /// subsequent calls return `None`.
    pub async fn take_inbound_receiver(
        &self,
    ) -> Option<mpsc::Receiver<switchboard_core::InboundMessage>> {
        self.inbound_rx.lock().await.take()
    }

    pub fn register_sink(&self, channel: impl Into<String>, sink: Arc<dyn OutboundSink>) {
        self.sinks.insert(channel.into(), sink);
    }

    pub fn unregister_sink(&self, channel: &str) {
        self.sinks.remove(channel);
    }

    /// Drains the outbound queue until `stop` resolves, routing each
    /// message to the sink registered for its channel. Missing channels
    /// are dropped with a debug log; sink failures are caught and logged
    /// so one misbehaving adapter cannot stall the others.
    pub async fn run_dispatcher(self: Arc<Self>, mut stop: tokio::sync::oneshot::Receiver<()>) {
        let mut outbound_rx = match self.outbound_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                tracing::warn!("MessageBus dispatcher already running");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = &mut stop => break,
                recv = tokio::time::timeout(DISPATCH_POLL, outbound_rx.recv()) => {
                    match recv {
                        Ok(Some(message)) => self.dispatch_one(message).await,
                        Ok(None) => break,
                        Err(_elapsed) => continue,
                    }
                }
            }
        }
    }

    async fn dispatch_one(&self, message: OutboundMessage) {
        let Some(sink) = self.sinks.get(&message.channel).map(|s| s.clone()) else {
            tracing::debug!(channel = %message.channel, "no sink registered, dropping outbound message");
            return;
        };
        sink.deliver(message).await;
    }
}
