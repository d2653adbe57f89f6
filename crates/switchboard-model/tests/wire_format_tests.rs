// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wire-format tests: spin up a minimal HTTP/1.1 mock server, point a wire
//! client at it, and assert both the HTTP request the client sent and the
//! `ChatResult` it produced from the canned response.
//!
//! These tests run without any API keys and without external network access.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use switchboard_model::anthropic::AnthropicClient;
use switchboard_model::openai_compat::OpenAICompatClient;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Debug)]
struct CapturedRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Value,
}

/// Bind a one-shot HTTP/1.1 mock server on a random loopback port. It accepts
/// exactly one request, captures it, and replies with the given status and
/// body. Returns the base URL and a receiver fulfilled once the request has
/// been fully read.
async fn mock_server_once(
    status: u16,
    resp_body: impl Into<String> + Send + 'static,
) -> (String, tokio::sync::oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = tokio::sync::oneshot::channel::<CapturedRequest>();

    tokio::spawn(async move {
        let resp_body: String = resp_body.into();
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut request_line = String::new();
        reader.read_line(&mut request_line).await.unwrap();
        let request_line = request_line.trim().to_string();
        let mut parts = request_line.splitn(3, ' ');
        let method = parts.next().unwrap_or("").to_string();
        let path = parts.next().unwrap_or("").to_string();

        let mut headers: HashMap<String, String> = HashMap::new();
        let mut content_length: usize = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some((k, v)) = trimmed.split_once(": ") {
                let key = k.to_lowercase();
                if key == "content-length" {
                    content_length = v.parse().unwrap_or(0);
                }
                headers.insert(key, v.to_string());
            }
        }

        let mut body_bytes = vec![0u8; content_length];
        reader.read_exact(&mut body_bytes).await.unwrap();
        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        let _ = tx.send(CapturedRequest { method, path, headers, body });

        let http_resp = format!(
            "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            resp_body.len(),
            resp_body,
        );
        let _ = write_half.write_all(http_resp.as_bytes()).await;
    });

    (format!("http://127.0.0.1:{port}"), rx)
}

// ── OpenAI-compatible client ─────────────────────────────────────────────────

#[tokio::test]
async fn openai_compat_sends_expected_request_and_parses_response() {
    let body = json!({
        "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 2}
    });
    let (base_url, req_rx) = mock_server_once(200, body.to_string()).await;

    let client = OpenAICompatClient::new(
        "gpt-4o-mini".into(),
        Some("sk-test".into()),
        Some(&base_url),
        4096,
        0.2,
        Duration::from_secs(5),
    );

    let result = client
        .chat(vec![json!({"role": "user", "content": "hello"})], Some("be terse"), None, None)
        .await
        .unwrap();

    assert_eq!(result.text, "hi there");
    assert_eq!(result.usage.unwrap().total_tokens, 12);

    let captured = req_rx.await.unwrap();
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.path, "/v1/chat/completions");
    assert_eq!(captured.headers.get("authorization").unwrap(), "Bearer sk-test");
    assert_eq!(captured.body["model"], "gpt-4o-mini");
    assert_eq!(captured.body["messages"][0]["role"], "system");
    assert_eq!(captured.body["messages"][1]["content"], "hello");
}

#[tokio::test]
async fn openai_compat_attaches_tools_array_when_non_empty() {
    let body = json!({"choices": [{"message": {"role": "assistant", "content": ""}}]});
    let (base_url, req_rx) = mock_server_once(200, body.to_string()).await;

    let client = OpenAICompatClient::new(
        "gpt-4o-mini".into(),
        Some("sk-test".into()),
        Some(&base_url),
        4096,
        0.2,
        Duration::from_secs(5),
    );

    let tools = vec![json!({
        "type": "function",
        "function": {"name": "read_file", "description": "reads a file", "parameters": {}}
    })];
    client
        .chat_with_tools(vec![json!({"role": "user", "content": "read it"})], tools, None)
        .await
        .unwrap();

    let captured = req_rx.await.unwrap();
    assert_eq!(captured.body["tool_choice"], "auto");
    assert_eq!(captured.body["tools"][0]["function"]["name"], "read_file");
}

#[tokio::test]
async fn openai_compat_parses_tool_calls_from_response() {
    let body = json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "function": {"name": "exec", "arguments": "{\"command\":\"ls\"}"}
                }]
            }
        }]
    });
    let (base_url, _req_rx) = mock_server_once(200, body.to_string()).await;

    let client = OpenAICompatClient::new(
        "gpt-4o-mini".into(),
        Some("sk-test".into()),
        Some(&base_url),
        4096,
        0.2,
        Duration::from_secs(5),
    );

    let result = client
        .chat_with_tools(vec![json!({"role": "user", "content": "list files"})], vec![], None)
        .await
        .unwrap();

    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].name, "exec");
    assert_eq!(result.tool_calls[0].arguments["command"], "ls");
}

#[tokio::test]
async fn openai_compat_non_200_response_is_an_error() {
    let (base_url, _req_rx) = mock_server_once(401, json!({"error": "bad key"}).to_string()).await;

    let client = OpenAICompatClient::new(
        "gpt-4o-mini".into(),
        Some("sk-wrong".into()),
        Some(&base_url),
        4096,
        0.2,
        Duration::from_secs(5),
    );

    let err = client
        .chat(vec![json!({"role": "user", "content": "hi"})], None, None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("401"));
}

// ── Anthropic client ──────────────────────────────────────────────────────────

#[tokio::test]
async fn anthropic_sends_expected_request_and_parses_response() {
    let body = json!({
        "content": [{"type": "text", "text": "hi there"}],
        "usage": {"input_tokens": 8, "output_tokens": 3}
    });
    let (base_url, req_rx) = mock_server_once(200, body.to_string()).await;

    let client = AnthropicClient::new(
        "claude-3-5-sonnet".into(),
        Some("sk-ant-test".into()),
        Some(&base_url),
        4096,
        0.2,
        Duration::from_secs(5),
    );

    let result = client
        .chat(vec![json!({"role": "user", "content": "hello"})], Some("be terse"))
        .await
        .unwrap();

    assert_eq!(result.text, "hi there");
    assert_eq!(result.usage.unwrap().total_tokens, 11);

    let captured = req_rx.await.unwrap();
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.path, "/v1/messages");
    assert_eq!(captured.headers.get("x-api-key").unwrap(), "sk-ant-test");
    assert!(captured.headers.contains_key("anthropic-version"));
    assert_eq!(captured.body["system"], "be terse");
    assert_eq!(captured.body["messages"][0]["content"], "hello");
    assert!(captured.body.get("tools").is_none());
}

#[tokio::test]
async fn anthropic_attaches_tools_when_present() {
    let body = json!({"content": []});
    let (base_url, req_rx) = mock_server_once(200, body.to_string()).await;

    let client = AnthropicClient::new(
        "claude-3-5-sonnet".into(),
        Some("sk-ant-test".into()),
        Some(&base_url),
        4096,
        0.2,
        Duration::from_secs(5),
    );

    let tools = vec![json!({
        "name": "read_file",
        "description": "reads a file",
        "input_schema": {"type": "object"}
    })];
    client
        .chat_with_tools(vec![json!({"role": "user", "content": "read it"})], tools, None)
        .await
        .unwrap();

    let captured = req_rx.await.unwrap();
    assert_eq!(captured.body["tools"][0]["name"], "read_file");
    assert!(captured.body.get("system").is_none());
}

#[tokio::test]
async fn anthropic_parses_tool_use_blocks_from_response() {
    let body = json!({
        "content": [
            {"type": "text", "text": "checking"},
            {"type": "tool_use", "id": "toolu_1", "name": "exec", "input": {"command": "ls"}}
        ]
    });
    let (base_url, _req_rx) = mock_server_once(200, body.to_string()).await;

    let client = AnthropicClient::new(
        "claude-3-5-sonnet".into(),
        Some("sk-ant-test".into()),
        Some(&base_url),
        4096,
        0.2,
        Duration::from_secs(5),
    );

    let result = client
        .chat(vec![json!({"role": "user", "content": "list files"})], None)
        .await
        .unwrap();

    assert_eq!(result.text, "checking");
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].name, "exec");
    assert_eq!(result.tool_calls[0].arguments["command"], "ls");
}

#[tokio::test]
async fn anthropic_non_200_response_is_an_error() {
    let (base_url, _req_rx) = mock_server_once(429, json!({"error": "rate limited"}).to_string()).await;

    let client = AnthropicClient::new(
        "claude-3-5-sonnet".into(),
        Some("sk-ant-test".into()),
        Some(&base_url),
        4096,
        0.2,
        Duration::from_secs(5),
    );

    let err = client
        .chat(vec![json!({"role": "user", "content": "hi"})], None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("429"));
}
