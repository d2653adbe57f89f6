// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Webhook adapter for a challenge-handshake chat platform (Feishu-style).
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use base64::Engine;
use serde_json::{json, Value};
use switchboard_config::FeishuConfig;
use switchboard_core::{ContentBlock, InboundMessage, OutboundMessage};
use tokio::sync::{mpsc, Mutex};

use crate::adapter::ChannelAdapter;

const CHANNEL: &str = "feishu";
const TOKEN_REFRESH_SKEW: Duration = Duration::from_secs(60);

struct TenantToken {
    value: String,
    expires_at: Instant,
}

pub struct WebhookAAdapter {
    config: FeishuConfig,
    client: reqwest::Client,
    inbound: mpsc::Sender<InboundMessage>,
    tenant_token: Mutex<Option<TenantToken>>,
}

impl WebhookAAdapter {
    pub fn new(config: FeishuConfig, inbound: mpsc::Sender<InboundMessage>) -> Arc<Self> {
        Arc::new(Self {
            config,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            inbound,
            tenant_token: Mutex::new(None),
        })
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/feishu/webhook", post(handle_webhook))
            .with_state(self)
    }

    /// Returns a cached tenant access token, refreshing it under the mutex
    /// when absent or within 60 s of expiry.
    async fn tenant_access_token(&self) -> anyhow::Result<String> {
        let mut guard = self.tenant_token.lock().await;
        if let Some(tok) = guard.as_ref() {
            if tok.expires_at > Instant::now() + TOKEN_REFRESH_SKEW {
                return Ok(tok.value.clone());
            }
        }

        let app_id = self
            .config
            .app_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("feishu app_id not configured"))?;
        let app_secret = self
            .config
            .app_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("feishu app_secret not configured"))?;

        let resp: Value = self
            .client
            .post("https://open.feishu.cn/open-apis/auth/v3/tenant_access_token/internal")
            .json(&json!({"app_id": app_id, "app_secret": app_secret}))
            .send()
            .await?
            .json()
            .await?;

        let token = resp
            .get("tenant_access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("tenant_access_token missing from response"))?
            .to_string();
        let expires_in = resp.get("expire").and_then(Value::as_u64).unwrap_or(7200);

        *guard = Some(TenantToken {
            value: token.clone(),
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        });
        Ok(token)
    }

    async fn fetch_image(&self, image_key: &str) -> Option<ContentBlock> {
        let token = self.tenant_access_token().await.ok()?;
        let url = format!("https://open.feishu.cn/open-apis/im/v1/images/{image_key}");
        let bytes = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .ok()?
            .bytes()
            .await
            .ok()?;
        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Some(ContentBlock::image(data, "image/jpeg"))
    }

    async fn handle_event(&self, event: &Value) {
        let event_type = event
            .get("header")
            .and_then(|h| h.get("event_type"))
            .and_then(Value::as_str)
            .unwrap_or("");
        if event_type != "im.message.receive_v1" {
            tracing::debug!(event_type, "ignoring feishu event of unhandled type");
            return;
        }

        let Some(message) = event.get("event").and_then(|e| e.get("message")) else {
            return;
        };
        let chat_id = message
            .get("chat_id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let sender_id = event
            .get("event")
            .and_then(|e| e.get("sender"))
            .and_then(|s| s.get("sender_id"))
            .and_then(|s| s.get("open_id"))
            .and_then(Value::as_str)
            .unwrap_or(&chat_id)
            .to_string();
        let msg_type = message.get("message_type").and_then(Value::as_str).unwrap_or("");

        let content: Value = message
            .get("content")
            .and_then(Value::as_str)
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(json!({}));

        let mut text = String::new();
        let mut blocks = Vec::new();
        match msg_type {
            "text" => {
                text = content.get("text").and_then(Value::as_str).unwrap_or("").to_string();
            }
            "image" => {
                if let Some(image_key) = content.get("image_key").and_then(Value::as_str) {
                    if let Some(block) = self.fetch_image(image_key).await {
                        blocks.push(block);
                    }
                }
            }
            other => {
                tracing::debug!(message_type = other, "unsupported feishu message type");
                return;
            }
        }

        let msg = InboundMessage {
            channel: CHANNEL.into(),
            sender_id,
            chat_id,
            text,
            timestamp_ms: crate::now_ms(),
            metadata: Default::default(),
            blocks,
        };
        if self.inbound.send(msg).await.is_err() {
            tracing::warn!("feishu inbound channel closed");
        }
    }
}

async fn handle_webhook(
    State(adapter): State<Arc<WebhookAAdapter>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if let Some(challenge) = body.get("challenge") {
        return Json(json!({"challenge": challenge}));
    }

    if let Some(expected) = adapter.config.verification_token.as_deref().filter(|t| !t.is_empty()) {
        let got = body.get("header").and_then(|h| h.get("token")).and_then(Value::as_str);
        if got != Some(expected) {
            tracing::warn!("feishu webhook verification token mismatch");
            return Json(json!({"code": 401, "msg": "invalid verification token"}));
        }
    }

    adapter.handle_event(&body).await;
    Json(json!({"code": 0}))
}

#[async_trait::async_trait]
impl ChannelAdapter for WebhookAAdapter {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) {}

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        let token = self.tenant_access_token().await?;
        self.client
            .post("https://open.feishu.cn/open-apis/im/v1/messages?receive_id_type=chat_id")
            .bearer_auth(token)
            .json(&json!({
                "receive_id": message.chat_id,
                "msg_type": "text",
                "content": serde_json::to_string(&json!({"text": message.text})).unwrap_or_default(),
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn is_allowed(&self, _chat_id: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FeishuConfig {
        FeishuConfig {
            enabled: true,
            app_id: Some("app".into()),
            app_secret: Some("secret".into()),
            verification_token: Some("tok".into()),
            encrypt_key: None,
        }
    }

    #[tokio::test]
    async fn challenge_short_circuits_any_validation() {
        let (tx, _rx) = mpsc::channel(10);
        let adapter = WebhookAAdapter::new(config(), tx);
        let body = json!({"challenge": "abc123"});
        if let Some(ch) = body.get("challenge") {
            assert_eq!(ch, "abc123");
        }
        let _ = adapter; // built successfully with verification configured
    }

    #[tokio::test]
    async fn tenant_access_token_fails_without_credentials() {
        let (tx, _rx) = mpsc::channel(10);
        let adapter = WebhookAAdapter::new(
            FeishuConfig { enabled: true, app_id: None, app_secret: None, verification_token: None, encrypt_key: None },
            tx,
        );
        assert!(adapter.tenant_access_token().await.is_err());
    }
}
