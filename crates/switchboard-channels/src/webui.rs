// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Embedded web UI: static assets plus a bidirectional `/ws` bridge.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use tower_http::services::ServeDir;
use serde::Deserialize;
use serde_json::json;
use switchboard_config::WebUIConfig;
use switchboard_core::{InboundMessage, OutboundMessage};
use tokio::sync::mpsc;

use crate::adapter::ChannelAdapter;
use crate::bus::OutboundSink;

const CHANNEL: &str = "webui";
const INDEX_HTML: &str = include_str!("../static/index.html");

pub struct WebUIAdapter {
    config: WebUIConfig,
    inbound: mpsc::Sender<InboundMessage>,
    clients: DashMap<String, mpsc::Sender<OutboundMessage>>,
    next_synthetic_id: AtomicU64,
}

impl WebUIAdapter {
    pub fn new(config: WebUIConfig, inbound: mpsc::Sender<InboundMessage>) -> Arc<Self> {
        Arc::new(Self {
            config,
            inbound,
            clients: DashMap::new(),
            next_synthetic_id: AtomicU64::new(1),
        })
    }

    /// `static_dir` holds any additional assets (CSS, client-side JS) beyond
    /// the embedded `index.html`; a missing directory serves 404s for
    /// `/static/*` without failing startup.
    pub fn router(self: Arc<Self>, static_dir: impl AsRef<std::path::Path>) -> Router {
        Router::new()
            .route("/", get(handle_index))
            .route("/ws", get(handle_ws))
            .nest_service("/static", ServeDir::new(static_dir))
            .with_state(self)
    }

    fn allows(&self, token: Option<&str>) -> Option<String> {
        if self.config.allowed_tokens.is_empty() {
            return Some(token.map(String::from).unwrap_or_else(|| self.synthetic_id()));
        }
        let token = token?;
        if !token.is_empty() && self.config.allowed_tokens.iter().any(|t| t == token) {
            Some(token.to_string())
        } else {
            None
        }
    }

    fn synthetic_id(&self) -> String {
        let n = self.next_synthetic_id.fetch_add(1, Ordering::SeqCst);
        format!("webui-{n}")
    }
}

#[derive(Deserialize)]
struct WsQuery {
    #[serde(default)]
    token: String,
}

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn handle_ws(
    ws: WebSocketUpgrade,
    State(adapter): State<Arc<WebUIAdapter>>,
    Query(query): Query<WsQuery>,
) -> Response {
    let token = if query.token.is_empty() { None } else { Some(query.token.as_str()) };
    let Some(client_id) = adapter.allows(token) else {
        return ws.on_upgrade(|socket| async move {
            let mut socket = socket;
            let _ = socket.close().await;
        });
    };
    ws.on_upgrade(move |socket| handle_socket(socket, adapter, client_id))
}

async fn handle_socket(mut socket: WebSocket, adapter: Arc<WebUIAdapter>, client_id: String) {
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(32);
    adapter.clients.insert(client_id.clone(), out_tx);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound_frame(&adapter, &client_id, &text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("webui websocket recv error: {e}");
                        break;
                    }
                }
            }
            outbound = out_rx.recv() => {
                match outbound {
                    Some(message) => {
                        let frame = json!({"type": "message", "content": message.text});
                        if let Ok(text) = serde_json::to_string(&frame) {
                            if socket.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    adapter.clients.remove(&client_id);
}

async fn handle_inbound_frame(adapter: &Arc<WebUIAdapter>, client_id: &str, text: &str) {
    let Ok(data) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };
    if data.get("type").and_then(serde_json::Value::as_str) != Some("message") {
        return;
    }
    let content = data
        .get("content")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();
    if content.is_empty() {
        return;
    }

    let msg = InboundMessage {
        channel: CHANNEL.into(),
        sender_id: client_id.to_string(),
        chat_id: client_id.to_string(),
        text: content,
        timestamp_ms: crate::now_ms(),
        metadata: Default::default(),
        blocks: vec![],
    };
    if adapter.inbound.send(msg).await.is_err() {
        tracing::warn!("webui inbound channel closed");
    }
}

#[async_trait::async_trait]
impl OutboundSink for WebUIAdapter {
    /// Routes to the addressed client if connected; otherwise broadcasts
    /// to every connected client.
    async fn deliver(&self, message: OutboundMessage) {
        if !message.chat_id.is_empty() {
            if let Some(sender) = self.clients.get(&message.chat_id) {
                let _ = sender.send(message).await;
                return;
            }
        }
        for entry in self.clients.iter() {
            let _ = entry.value().send(message.clone()).await;
        }
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for WebUIAdapter {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) {
        self.clients.clear();
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        OutboundSink::deliver(self, message).await;
        Ok(())
    }

    fn is_allowed(&self, chat_id: &str) -> bool {
        if self.config.allowed_tokens.is_empty() {
            return true;
        }
        self.config.allowed_tokens.iter().any(|t| t == chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_any_token_when_list_empty() {
        let (tx, _rx) = mpsc::channel(10);
        let adapter = WebUIAdapter::new(WebUIConfig { enabled: true, path: "/ui".into(), allowed_tokens: vec![] }, tx);
        assert!(adapter.allows(None).is_some());
        assert!(adapter.allows(Some("anything")).is_some());
    }

    #[tokio::test]
    async fn rejects_missing_token_when_list_configured() {
        let (tx, _rx) = mpsc::channel(10);
        let adapter = WebUIAdapter::new(
            WebUIConfig { enabled: true, path: "/ui".into(), allowed_tokens: vec!["secret".into()] },
            tx,
        );
        assert!(adapter.allows(None).is_none());
        assert!(adapter.allows(Some("wrong")).is_none());
        assert_eq!(adapter.allows(Some("secret")), Some("secret".to_string()));
    }

    #[tokio::test]
    async fn synthetic_ids_increase_monotonically() {
        let (tx, _rx) = mpsc::channel(10);
        let adapter = WebUIAdapter::new(WebUIConfig { enabled: true, path: "/ui".into(), allowed_tokens: vec![] }, tx);
        let a = adapter.allows(None).unwrap();
        let b = adapter.allows(None).unwrap();
        assert_ne!(a, b);
    }
}
