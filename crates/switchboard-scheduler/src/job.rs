// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cron job record: schedule, payload, and run-state, as persisted to disk.
use serde::{Deserialize, Serialize};

/// When a job fires. `Cron` is a standard five-field expression evaluated
/// against the job's last run time (or service start, if never run).
/// `Every` fires on a fixed interval. `At` fires once at an absolute
/// timestamp and disables itself immediately beforehand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Schedule {
    Cron { expr: String },
    Every { every_ms: i64 },
    At { at_ms: i64 },
}

/// What a firing job hands back to `AgentRunner::run`, and where to
/// deliver the reply if anywhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payload {
    pub message: String,
    #[serde(default)]
    pub deliver: bool,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobState {
    #[serde(default)]
    pub last_run_at_ms: i64,
    #[serde(default)]
    pub last_status: String,
    #[serde(default)]
    pub last_error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub schedule: Schedule,
    pub payload: Payload,
    #[serde(default)]
    pub delete_after_run: bool,
    #[serde(default)]
    pub state: JobState,
}

impl CronJob {
    pub fn new(name: impl Into<String>, schedule: Schedule, payload: Payload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            enabled: true,
            schedule,
            payload,
            delete_after_run: false,
            state: JobState::default(),
        }
    }
}
