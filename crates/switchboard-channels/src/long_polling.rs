// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Long-polling bot adapter (Telegram-style `getUpdates`/`getFile`).
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use serde_json::Value;
use switchboard_config::TelegramConfig;
use switchboard_core::{ContentBlock, InboundMessage, OutboundMessage};
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;

use crate::adapter::ChannelAdapter;

const CHANNEL: &str = "telegram";
const LONG_POLL_TIMEOUT_SECS: u64 = 30;
const BACKOFF: Duration = Duration::from_secs(2);

pub struct LongPollingAdapter {
    config: TelegramConfig,
    client: reqwest::Client,
    inbound: mpsc::Sender<InboundMessage>,
    offset: AtomicI64,
    stop: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl LongPollingAdapter {
    pub fn new(config: TelegramConfig, inbound: mpsc::Sender<InboundMessage>) -> Arc<Self> {
        Arc::new(Self {
            config,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 15))
                .build()
                .unwrap_or_default(),
            inbound,
            offset: AtomicI64::new(0),
            stop: Mutex::new(None),
        })
    }

    fn base_url(&self) -> Option<String> {
        self.config
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|token| format!("https://api.telegram.org/bot{token}"))
    }

    async fn poll_loop(self: Arc<Self>, mut stop: tokio::sync::oneshot::Receiver<()>) {
        let Some(base) = self.base_url() else {
            tracing::warn!("telegram adapter started with no bot token, not polling");
            return;
        };

        loop {
            if stop.try_recv().is_ok() {
                break;
            }
            let offset = self.offset.load(Ordering::SeqCst);
            let url = format!("{base}/getUpdates");
            let result = self
                .client
                .get(&url)
                .query(&[
                    ("timeout", LONG_POLL_TIMEOUT_SECS.to_string()),
                    ("offset", offset.to_string()),
                ])
                .send()
                .await;

            let updates = match result {
                Ok(resp) => match resp.json::<Value>().await {
                    Ok(body) => body
                        .get("result")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default(),
                    Err(e) => {
                        tracing::warn!("telegram getUpdates: bad response body: {e}");
                        sleep(BACKOFF).await;
                        continue;
                    }
                },
                Err(e) => {
                    tracing::warn!("telegram getUpdates failed: {e}");
                    sleep(BACKOFF).await;
                    continue;
                }
            };

            for update in &updates {
                if let Some(id) = update.get("update_id").and_then(Value::as_i64) {
                    self.offset.store(id + 1, Ordering::SeqCst);
                }
                if let Some(msg) = self.parse_update(&base, update).await {
                    if self.inbound.send(msg).await.is_err() {
                        tracing::warn!("telegram inbound channel closed, stopping poll loop");
                        return;
                    }
                }
            }
        }
    }

    async fn parse_update(&self, base: &str, update: &Value) -> Option<InboundMessage> {
        let message = update.get("message")?;
        let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();
        let sender_id = message
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_else(|| chat_id.clone());
        let timestamp_ms = message
            .get("date")
            .and_then(Value::as_i64)
            .map(|secs| secs * 1000)
            .unwrap_or(0);

        let text = message
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| message.get("caption").and_then(Value::as_str))
            .unwrap_or("")
            .to_string();

        let mut blocks = Vec::new();
        if let Some(photos) = message.get("photo").and_then(Value::as_array) {
            if let Some(largest) = photos.last() {
                if let Some(file_id) = largest.get("file_id").and_then(Value::as_str) {
                    if let Some(block) = self.fetch_file(base, file_id).await {
                        blocks.push(block);
                    }
                }
            }
        }
        if let Some(doc) = message.get("document") {
            if let Some(file_id) = doc.get("file_id").and_then(Value::as_str) {
                if let Some(block) = self.fetch_file(base, file_id).await {
                    blocks.push(block);
                }
            }
        }

        Some(InboundMessage {
            channel: CHANNEL.into(),
            sender_id,
            chat_id,
            text,
            timestamp_ms,
            metadata: Default::default(),
            blocks,
        })
    }

    /// Two-step fetch: `getFile` for the storage path, then a plain
    /// download from the file server, base64-encoded into a `ContentBlock`.
    async fn fetch_file(&self, base: &str, file_id: &str) -> Option<ContentBlock> {
        let meta: Value = self
            .client
            .get(format!("{base}/getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await
            .ok()?
            .json()
            .await
            .ok()?;
        let path = meta.get("result")?.get("file_path")?.as_str()?;
        let token = base.rsplit("/bot").next()?;
        let download_url = format!("https://api.telegram.org/file/bot{token}/{path}");
        let bytes = self.client.get(&download_url).send().await.ok()?.bytes().await.ok()?;
        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let media_type = guess_media_type(path);
        Some(ContentBlock::from_media(data, media_type))
    }
}

fn guess_media_type(path: &str) -> String {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[async_trait::async_trait]
impl ChannelAdapter for LongPollingAdapter {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
        *self.stop.lock().await = Some(stop_tx);
        tokio::spawn(self.poll_loop(stop_rx));
        Ok(())
    }

    async fn stop(&self) {
        if let Some(tx) = self.stop.lock().await.take() {
            let _ = tx.send(());
        }
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        let base = self
            .base_url()
            .ok_or_else(|| anyhow::anyhow!("telegram adapter has no bot token configured"))?;
        self.client
            .post(format!("{base}/sendMessage"))
            .json(&serde_json::json!({
                "chat_id": message.chat_id,
                "text": message.text,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn is_allowed(&self, chat_id: &str) -> bool {
        if self.config.allowed_chat_ids.is_empty() {
            return true;
        }
        chat_id
            .parse::<i64>()
            .map(|id| self.config.allowed_chat_ids.contains(&id))
            .unwrap_or(false)
    }
}
