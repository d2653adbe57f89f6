// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Append-only newline-delimited JSON token usage journal.
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use switchboard_model::Usage;
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
struct UsageRecord<'a> {
    session: &'a str,
    model: &'a str,
    #[serde(rename = "promptTokens")]
    prompt_tokens: u32,
    #[serde(rename = "completionTokens")]
    completion_tokens: u32,
    #[serde(rename = "totalTokens")]
    total_tokens: u32,
    #[serde(rename = "timestampMs")]
    timestamp_ms: i64,
}

/// Appends one JSON object per line to the configured usage file. A write
/// failure is logged and otherwise ignored — usage tracking never aborts
/// the turn that produced it.
pub struct TokenUsageJournal {
    path: PathBuf,
    enabled: bool,
    lock: Mutex<()>,
}

impl TokenUsageJournal {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self { path: path.into(), enabled, lock: Mutex::new(()) }
    }

    pub async fn record(&self, session: &str, model: &str, usage: Usage, timestamp_ms: i64) {
        if !self.enabled {
            return;
        }
        let record = UsageRecord {
            session,
            model,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            timestamp_ms,
        };
        let line = match serde_json::to_string(&record) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize usage record");
                return;
            }
        };
        let _guard = self.lock.lock().await;
        if let Err(e) = self.append_line(&line) {
            tracing::warn!(error = %e, path = %self.path.display(), "failed to append usage record");
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}
