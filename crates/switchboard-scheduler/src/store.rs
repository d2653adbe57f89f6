// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! On-disk persistence for the job list: load whole-file, save atomically.
use std::path::{Path, PathBuf};

use crate::job::CronJob;

/// Reads the job list from `path`. A missing or empty file is not an
/// error — it means no jobs have ever been saved.
pub fn load(path: &Path) -> anyhow::Result<Vec<CronJob>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

/// Writes the job list to `path` atomically: serialize to a sibling temp
/// file, then `rename` over the real path. A crash mid-write leaves the
/// previous file intact rather than a half-written one.
pub fn save(path: &Path, jobs: &[CronJob]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(jobs)?;
    let tmp_path = tmp_path_for(path);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| format!(".{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| ".jobs.json.tmp".into());
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Payload, Schedule};

    #[test]
    fn load_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.json");
        let jobs = vec![CronJob::new(
            "ping",
            Schedule::Every { every_ms: 1000 },
            Payload { message: "hi".into(), ..Default::default() },
        )];
        save(&path, &jobs).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "ping");
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        save(&path, &[]).unwrap();
        assert!(!tmp_path_for(&path).exists());
        assert!(path.exists());
    }
}
