// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tick loop that fires due jobs and journals their outcome.
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};
use tokio::sync::Mutex;
use tokio::time::Duration;

use crate::job::{CronJob, Schedule};
use crate::store;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Receives a due job and returns the text `AgentRunner::run` produced (or
/// an error, recorded in the job's `JobState`).
#[async_trait::async_trait]
pub trait CronHandler: Send + Sync {
    async fn run_job(&self, job: &CronJob) -> anyhow::Result<String>;
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct CronService {
    store_path: PathBuf,
    jobs: Mutex<Vec<CronJob>>,
    handler: Arc<dyn CronHandler>,
    start_time_ms: i64,
    stop: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl CronService {
    pub fn new(store_path: PathBuf, handler: Arc<dyn CronHandler>) -> Arc<Self> {
        Arc::new(Self {
            store_path,
            jobs: Mutex::new(Vec::new()),
            handler,
            start_time_ms: now_ms(),
            stop: Mutex::new(None),
        })
    }

    pub async fn add_job(&self, job: CronJob) -> anyhow::Result<()> {
        let mut jobs = self.jobs.lock().await;
        jobs.push(job);
        store::save(&self.store_path, &jobs)?;
        Ok(())
    }

    pub async fn list_jobs(&self) -> Vec<CronJob> {
        self.jobs.lock().await.clone()
    }

    pub async fn remove_job(&self, job_id: &str) -> anyhow::Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != job_id);
        let removed = jobs.len() != before;
        if removed {
            store::save(&self.store_path, &jobs)?;
        }
        Ok(removed)
    }

    pub async fn set_enabled(&self, job_id: &str, enabled: bool) -> anyhow::Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
            return Ok(false);
        };
        job.enabled = enabled;
        store::save(&self.store_path, &jobs)?;
        Ok(true)
    }

    /// Loads the job store and spawns the tick loop.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let loaded = store::load(&self.store_path)?;
        *self.jobs.lock().await = loaded;

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
        *self.stop.lock().await = Some(stop_tx);
        tokio::spawn(self.clone().tick_loop(stop_rx));
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(tx) = self.stop.lock().await.take() {
            let _ = tx.send(());
        }
    }

    async fn tick_loop(self: Arc<Self>, mut stop: tokio::sync::oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let now = now_ms();
        let mut due_ids = Vec::new();
        {
            let mut jobs = self.jobs.lock().await;
            for job in jobs.iter_mut() {
                if !job.enabled {
                    continue;
                }
                let due = match &job.schedule {
                    Schedule::Cron { expr } => cron_due(expr, job.state.last_run_at_ms, self.start_time_ms, now),
                    Schedule::Every { every_ms } => {
                        *every_ms > 0 && now >= job.state.last_run_at_ms + every_ms
                    }
                    Schedule::At { at_ms } => {
                        if *at_ms > 0 && now >= *at_ms {
                            // `at` jobs disable before running, per the original.
                            job.enabled = false;
                            true
                        } else {
                            false
                        }
                    }
                };
                if due {
                    due_ids.push(job.id.clone());
                }
            }
        }

        // Resolve by id rather than index: an earlier job in this same tick
        // may have `delete_after_run` set, which shifts every later index.
        for id in due_ids {
            self.run_job_by_id(&id).await;
        }
    }

    async fn run_job_by_id(&self, job_id: &str) {
        let job_snapshot = {
            let jobs = self.jobs.lock().await;
            match jobs.iter().find(|j| j.id == job_id) {
                Some(j) => j.clone(),
                None => return,
            }
        };

        let result = self.handler.run_job(&job_snapshot).await;

        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == job_snapshot.id) else {
            return;
        };
        match result {
            Ok(_) => {
                job.state.last_status = "ok".into();
                job.state.last_error.clear();
            }
            Err(e) => {
                job.state.last_status = "error".into();
                job.state.last_error = e.to_string();
            }
        }
        job.state.last_run_at_ms = now_ms();

        let delete_after_run = job.delete_after_run;
        let job_id = job.id.clone();
        if delete_after_run {
            jobs.retain(|j| j.id != job_id);
        }

        if let Err(e) = store::save(&self.store_path, &jobs) {
            tracing::warn!("failed to persist cron job store: {e}");
        }
    }
}

/// `base_ms` is the job's last run time if nonzero, else service start.
/// Finds the next fire time after `base` and compares against `now`.
fn cron_due(expr: &str, last_run_at_ms: i64, start_time_ms: i64, now_ms: i64) -> bool {
    if expr.trim().is_empty() {
        return false;
    }
    let base_ms = if last_run_at_ms != 0 { last_run_at_ms } else { start_time_ms };
    let Some(base) = Utc.timestamp_millis_opt(base_ms).single() else {
        return false;
    };

    // The `cron` crate expects a leading seconds field; the schedules this
    // system stores are standard five-field expressions.
    let six_field = format!("0 {expr}");
    let schedule = match cron::Schedule::from_str(&six_field) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(expr, "invalid cron expression: {e}");
            return false;
        }
    };
    let Some(next) = schedule.after(&base).next() else {
        return false;
    };
    now_ms >= next.timestamp_millis()
}
