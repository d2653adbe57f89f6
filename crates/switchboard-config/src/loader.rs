// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// `~/.switchboard/config.json`, the canonical config location.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchboard")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Pre-rename config location, checked only when the canonical path is absent.
fn legacy_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ember").join("config.json"))
}

/// Top-level section names that were renamed at some point; maps old name to
/// the current [`Config`] field name. Applied before deserialisation so
/// configs written against either name continue to load.
const LEGACY_SECTION_ALIASES: &[(&str, &str)] = &[
    ("runtime", "provider"),
    ("core", "agent"),
    ("adapters", "channels"),
    ("actions", "tools"),
    ("callbacks", "hooks"),
    ("trim", "autoCompact"),
    ("usage", "tokenTracking"),
    ("server", "gateway"),
];

/// Rewrite any legacy top-level keys present in `value` to their current name.
/// If both the legacy and current key are present, the current key wins and
/// the legacy entry is dropped untouched.
fn remap_legacy_keys(value: &mut serde_json::Value) {
    let Some(map) = value.as_object_mut() else {
        return;
    };
    for (old, new) in LEGACY_SECTION_ALIASES {
        if let Some(v) = map.remove(*old) {
            map.entry(new.to_string()).or_insert(v);
        }
    }
}

/// Load configuration from the canonical path, falling back to the
/// pre-rename location, then to an explicit override path if given.
/// Returns [`Config::default`] when no config file exists anywhere.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let candidate = if let Some(p) = explicit {
        Some(p.to_path_buf())
    } else if config_path().is_file() {
        Some(config_path())
    } else {
        legacy_config_path().filter(|p| p.is_file())
    };

    let Some(path) = candidate else {
        let mut config = Config::default();
        apply_env_overrides(&mut config);
        return Ok(config);
    };

    debug!(path = %path.display(), "loading config");
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    remap_legacy_keys(&mut value);

    let mut config: Config =
        serde_json::from_value(value).with_context(|| format!("deserialising {}", path.display()))?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Overlay select environment variables onto an already-loaded config.
/// Mirrors the original's env-var precedence: an env var always wins over
/// whatever the config file said, since env vars are set by whoever is
/// launching the process right now.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("SWITCHBOARD_PROVIDER_TYPE") {
        if !v.is_empty() {
            config.provider.r#type = v;
        }
    }
    if let Ok(v) = std::env::var("SWITCHBOARD_BASE_URL") {
        if !v.is_empty() {
            config.provider.base_url = Some(v);
        }
    }
    if let Ok(v) = std::env::var("SWITCHBOARD_MODEL") {
        if !v.is_empty() {
            config.agent.model = v;
        }
    }
    if let Ok(v) = std::env::var("SWITCHBOARD_WORKSPACE") {
        if !v.is_empty() {
            config.agent.workspace = v;
        }
    }
}

/// Resolve the provider API key, preferring an explicit config value, then
/// environment variables in order: `SWITCHBOARD_API_KEY`, `OPENAI_API_KEY`,
/// `ANTHROPIC_API_KEY`, `DEEPSEEK_API_KEY`, `MINIMAX_API_KEY`. The first
/// non-empty value wins.
pub fn resolve_api_key(config: &Config) -> Option<String> {
    if let Some(key) = &config.provider.api_key {
        if !key.is_empty() {
            return Some(key.clone());
        }
    }
    for var in [
        "SWITCHBOARD_API_KEY",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "DEEPSEEK_API_KEY",
        "MINIMAX_API_KEY",
    ] {
        if let Ok(val) = std::env::var(var) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
