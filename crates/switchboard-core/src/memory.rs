// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Long-term and daily-journal notes folded into the system prompt.
use std::path::{Path, PathBuf};

use chrono::Utc;

/// Reads `journal/LONGTERM.md` and the most recent daily journal files
/// under a workspace, falling back to the legacy `memory/` directory
/// layout when the new one is absent.
pub struct MemoryStore {
    workspace: PathBuf,
}

const MAX_JOURNAL_FILES: usize = 7;

impl MemoryStore {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self { workspace: workspace.into() }
    }

    fn longterm_path(&self) -> PathBuf {
        let modern = self.workspace.join("journal").join("LONGTERM.md");
        if modern.exists() {
            return modern;
        }
        self.workspace.join("memory").join("MEMORY.md")
    }

    fn journal_dir(&self) -> PathBuf {
        let modern = self.workspace.join("journal");
        if modern.is_dir() {
            return modern;
        }
        self.workspace.join("memory")
    }

    /// `# Long-term Memory` section body, or `None` if the file is absent
    /// or empty.
    pub fn longterm(&self) -> Option<String> {
        read_nonempty(&self.longterm_path())
    }

    /// Up to the 7 most-recent `YYYY-MM-DD.md` journal files, oldest
    /// first, concatenated with a blank line between entries.
    pub fn recent_journal(&self) -> Option<String> {
        let dir = self.journal_dir();
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().and_then(|e| e.to_str()) == Some("md")
                    && p.file_stem()
                        .and_then(|s| s.to_str())
                        .map(is_date_stem)
                        .unwrap_or(false)
            })
            .collect();
        entries.sort();
        let tail: Vec<PathBuf> = entries
            .into_iter()
            .rev()
            .take(MAX_JOURNAL_FILES)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let mut bodies = Vec::new();
        for path in tail {
            if let Some(body) = read_nonempty(&path) {
                bodies.push(body);
            }
        }
        if bodies.is_empty() {
            None
        } else {
            Some(bodies.join("\n\n"))
        }
    }

    /// Builds the combined system-prompt sections: `# Long-term Memory`
    /// then `# Recent Journal`, each omitted entirely when empty.
    pub fn system_prompt_sections(&self) -> Vec<String> {
        let mut sections = Vec::new();
        if let Some(longterm) = self.longterm() {
            sections.push(format!("# Long-term Memory\n{longterm}"));
        }
        if let Some(journal) = self.recent_journal() {
            sections.push(format!("# Recent Journal\n{journal}"));
        }
        sections
    }

    /// Appends `text` to today's journal entry, creating the `journal/`
    /// directory and file if needed. Surfaced as a local tool, never
    /// called by `AgentRunner` directly.
    pub fn append_today(&self, text: &str) -> std::io::Result<()> {
        let dir = self.workspace.join("journal");
        std::fs::create_dir_all(&dir)?;
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let path = dir.join(format!("{today}.md"));
        let existing = std::fs::read_to_string(&path).unwrap_or_default();
        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(text);
        updated.push('\n');
        std::fs::write(&path, updated)
    }
}

fn is_date_stem(stem: &str) -> bool {
    stem.len() == 10
        && stem.as_bytes()[4] == b'-'
        && stem.as_bytes()[7] == b'-'
        && stem.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn read_nonempty(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
