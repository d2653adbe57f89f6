// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Webhook adapter for an HMAC-signed chat platform (Slack-style).
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use switchboard_config::SlackConfig;
use switchboard_core::{InboundMessage, OutboundMessage};
use tokio::sync::mpsc;

use crate::adapter::ChannelAdapter;

const CHANNEL: &str = "slack";
const MAX_TIMESTAMP_SKEW_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

pub struct WebhookBAdapter {
    config: SlackConfig,
    client: reqwest::Client,
    inbound: mpsc::Sender<InboundMessage>,
}

impl WebhookBAdapter {
    pub fn new(config: SlackConfig, inbound: mpsc::Sender<InboundMessage>) -> Arc<Self> {
        Arc::new(Self {
            config,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            inbound,
        })
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/slack/events", post(handle_events))
            .with_state(self)
    }

    /// Verifies `v0:<timestamp>:<body>` HMAC-SHA256 against the `v0=<hex>`
    /// signature header, rejecting stale timestamps (> 300 s skew).
    fn verify_signature(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        let Some(secret) = self.config.signing_secret.as_deref().filter(|s| !s.is_empty()) else {
            return false;
        };
        let Some(timestamp) = headers
            .get("x-slack-request-timestamp")
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        let Some(signature) = headers
            .get("x-slack-signature")
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };

        let Ok(ts) = timestamp.parse::<i64>() else {
            return false;
        };
        if (crate::now_ms() / 1000 - ts).abs() > MAX_TIMESTAMP_SKEW_SECS {
            return false;
        }

        let base = format!("v0:{timestamp}:{}", String::from_utf8_lossy(body));
        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(m) => m,
            Err(_) => return false,
        };
        mac.update(base.as_bytes());
        let expected = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

        expected.as_bytes().ct_eq(signature.as_bytes()).into()
    }

    async fn handle_event(&self, event: &Value) {
        let Some(message) = event.get("event").filter(|e| e.get("type").and_then(Value::as_str) == Some("message")) else {
            return;
        };
        if message.get("bot_id").is_some() {
            return;
        }
        let chat_id = message.get("channel").and_then(Value::as_str).unwrap_or("").to_string();
        let sender_id = message.get("user").and_then(Value::as_str).unwrap_or("").to_string();
        let text = message.get("text").and_then(Value::as_str).unwrap_or("").to_string();

        let msg = InboundMessage {
            channel: CHANNEL.into(),
            sender_id,
            chat_id,
            text,
            timestamp_ms: crate::now_ms(),
            metadata: Default::default(),
            blocks: vec![],
        };
        if self.inbound.send(msg).await.is_err() {
            tracing::warn!("slack inbound channel closed");
        }
    }
}

async fn handle_events(
    State(adapter): State<Arc<WebhookBAdapter>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Ok(parsed) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid json"}))).into_response();
    };

    if let Some(challenge) = parsed.get("challenge") {
        return (StatusCode::OK, Json(json!({"challenge": challenge}))).into_response();
    }

    if !adapter.verify_signature(&headers, &body) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid signature"}))).into_response();
    }

    adapter.handle_event(&parsed).await;
    (StatusCode::OK, Json(json!({"ok": true}))).into_response()
}

#[async_trait::async_trait]
impl ChannelAdapter for WebhookBAdapter {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) {}

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        let token = self
            .config
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow::anyhow!("slack bot_token not configured"))?;
        self.client
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(token)
            .json(&json!({"channel": message.chat_id, "text": message.text}))
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

    fn adapter() -> Arc<WebhookBAdapter> {
        let (tx, _rx) = mpsc::channel(10);
        WebhookBAdapter::new(
            SlackConfig {
                enabled: true,
                bot_token: Some("tok".into()),
                signing_secret: Some("shh".into()),
            },
            tx,
        )
    }

    fn sign(secret: &str, timestamp: &str, body: &str) -> String {
        let base = format!("v0:{timestamp}:{body}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(base.as_bytes());
        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_valid_signature_within_skew() {
        let a = adapter();
        let now = crate::now_ms() / 1000;
        let ts = now.to_string();
        let body = r#"{"event":"x"}"#;
        let sig = sign("shh", &ts, body);

        let mut headers = HeaderMap::new();
        headers.insert("x-slack-request-timestamp", ts.parse().unwrap());
        headers.insert("x-slack-signature", sig.parse().unwrap());

        assert!(a.verify_signature(&headers, body.as_bytes()));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let a = adapter();
        let ts = (crate::now_ms() / 1000 - 400).to_string();
        let body = r#"{"event":"x"}"#;
        let sig = sign("shh", &ts, body);

        let mut headers = HeaderMap::new();
        headers.insert("x-slack-request-timestamp", ts.parse().unwrap());
        headers.insert("x-slack-signature", sig.parse().unwrap());

        assert!(!a.verify_signature(&headers, body.as_bytes()));
    }

    #[test]
    fn rejects_wrong_signature() {
        let a = adapter();
        let ts = (crate::now_ms() / 1000).to_string();
        let body = r#"{"event":"x"}"#;

        let mut headers = HeaderMap::new();
        headers.insert("x-slack-request-timestamp", ts.parse().unwrap());
        headers.insert("x-slack-signature", "v0=deadbeef".parse().unwrap());

        assert!(!a.verify_signature(&headers, body.as_bytes()));
    }
}
