// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Periodic self-check: on a fixed interval, reads `PULSE.md` from the
//! workspace and, if it has content, runs it through the agent under the
//! `"system"` session so the agent can act on standing instructions without
//! a human prompting it.
use std::path::PathBuf;
use std::sync::Arc;

use switchboard_core::AgentRunner;
use tokio::sync::Mutex;
use tokio::time::Duration;

pub struct HeartbeatService {
    workspace: PathBuf,
    interval: Duration,
    runner: Arc<AgentRunner>,
    stop: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl HeartbeatService {
    pub fn new(workspace: PathBuf, interval_secs: u64, runner: Arc<AgentRunner>) -> Arc<Self> {
        Arc::new(Self {
            workspace,
            interval: Duration::from_secs(interval_secs),
            runner,
            stop: Mutex::new(None),
        })
    }

    pub async fn start(self: &Arc<Self>) {
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
        *self.stop.lock().await = Some(stop_tx);
        tokio::spawn(self.clone().tick_loop(stop_rx));
    }

    pub async fn stop(&self) {
        if let Some(tx) = self.stop.lock().await.take() {
            let _ = tx.send(());
        }
    }

    async fn tick_loop(self: Arc<Self>, mut stop: tokio::sync::oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await; // first tick fires immediately, skip it
        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = interval.tick() => self.beat().await,
            }
        }
    }

    async fn beat(&self) {
        let Some(prompt) = switchboard_core::load_heartbeat_prompt(&self.workspace) else {
            return;
        };
        let reply = self.runner.run("system", &prompt, vec![]).await;
        tracing::info!(reply_len = reply.len(), "heartbeat ran");
    }
}
