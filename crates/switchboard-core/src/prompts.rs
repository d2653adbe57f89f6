// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Base persona file loading, with legacy filename fallbacks.
use std::path::{Path, PathBuf};

/// Reads `PROMPT.md` and `PERSONA.md` from the workspace root, falling back
/// to the legacy `AGENTS.md` and `SOUL.md` names respectively when the
/// modern file is absent. Missing/empty files are simply omitted.
pub fn load_persona_sections(workspace: &Path) -> Vec<String> {
    let mut sections = Vec::new();
    if let Some(body) = read_first_nonempty(&[
        workspace.join("PROMPT.md"),
        workspace.join("AGENTS.md"),
    ]) {
        sections.push(body);
    }
    if let Some(body) = read_first_nonempty(&[
        workspace.join("PERSONA.md"),
        workspace.join("SOUL.md"),
    ]) {
        sections.push(body);
    }
    sections
}

/// Reads `PULSE.md`, falling back to the legacy `HEARTBEAT.md`. Used by the
/// heartbeat service to decide whether a self-check prompt has any content
/// worth injecting.
pub fn load_heartbeat_prompt(workspace: &Path) -> Option<String> {
    read_first_nonempty(&[workspace.join("PULSE.md"), workspace.join("HEARTBEAT.md")])
}

fn read_first_nonempty(candidates: &[PathBuf]) -> Option<String> {
    for path in candidates {
        if let Ok(content) = std::fs::read_to_string(path) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}
