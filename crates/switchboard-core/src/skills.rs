// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Keyword-matched markdown snippets loaded from a skills directory.
use std::path::Path;

use serde::Deserialize;

/// A single `<skill>/SKILL.md` entry: YAML frontmatter plus a markdown body.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub keywords: Vec<String>,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

impl Skill {
    /// True when `text`, case-folded, contains the skill's name or any of
    /// its keywords as a substring.
    pub fn matches(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        if lowered.contains(&self.name.to_lowercase()) {
            return true;
        }
        self.keywords
            .iter()
            .any(|kw| !kw.is_empty() && lowered.contains(&kw.to_lowercase()))
    }
}

/// Parses a `SKILL.md` file: `---`-delimited YAML frontmatter followed by
/// a markdown body. Falls back to using the directory name and an empty
/// keyword list when frontmatter is absent or malformed.
fn parse_skill_md(dir_name: &str, content: &str) -> Skill {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix("---") {
        if let Some(end) = rest.find("\n---") {
            let yaml = &rest[..end];
            let body = rest[end + 4..].trim_start_matches('\n').to_string();
            if let Ok(fm) = serde_yaml::from_str::<Frontmatter>(yaml) {
                return Skill {
                    name: fm.name.unwrap_or_else(|| dir_name.to_string()),
                    keywords: normalize_keywords(fm.keywords),
                    body,
                };
            }
        }
    }
    Skill { name: dir_name.to_string(), keywords: Vec::new(), body: content.to_string() }
}

/// Lowercases, deduplicates, and sorts a skill's keyword set per the
/// documented data-model invariant.
fn normalize_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut keywords: Vec<String> = keywords.into_iter().map(|kw| kw.to_lowercase()).collect();
    keywords.sort();
    keywords.dedup();
    keywords
}

/// Loads every `<dir>/*/SKILL.md` under `skills_dir`. Missing directory is
/// not an error — an empty skill set is returned.
pub fn load_skills(skills_dir: &Path) -> Vec<Skill> {
    let Ok(entries) = std::fs::read_dir(skills_dir) else {
        return Vec::new();
    };
    let mut skills = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let skill_md = path.join("SKILL.md");
        let Ok(content) = std::fs::read_to_string(&skill_md) else {
            continue;
        };
        let dir_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("skill")
            .to_string();
        skills.push(parse_skill_md(&dir_name, &content));
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

/// Skills whose name or keywords appear in `text`, in load order.
pub fn matching_skills<'a>(skills: &'a [Skill], text: &str) -> Vec<&'a Skill> {
    skills.iter().filter(|s| s.matches(text)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_skill(dir: &Path, name: &str, frontmatter: &str, body: &str) {
        let skill_dir = dir.join(name);
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(skill_dir.join("SKILL.md"), format!("---\n{frontmatter}\n---\n{body}")).unwrap();
    }

    #[test]
    fn load_skills_parses_frontmatter_and_body() {
        let dir = tempdir().unwrap();
        write_skill(dir.path(), "weather", "name: weather\nkeywords:\n  - forecast\n  - rain", "Check the weather API.");
        let skills = load_skills(dir.path());
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "weather");
        assert_eq!(skills[0].keywords, vec!["forecast", "rain"]);
        assert_eq!(skills[0].body.trim(), "Check the weather API.");
    }

    #[test]
    fn load_skills_missing_dir_returns_empty() {
        let skills = load_skills(Path::new("/nonexistent/skills/dir"));
        assert!(skills.is_empty());
    }

    #[test]
    fn matches_is_case_insensitive_substring() {
        let skill = Skill { name: "Weather".into(), keywords: vec!["Forecast".into()], body: String::new() };
        assert!(skill.matches("what's the FORECAST today"));
        assert!(skill.matches("ask about weather"));
        assert!(!skill.matches("unrelated question"));
    }

    #[test]
    fn matching_skills_filters_to_relevant() {
        let skills = vec![
            Skill { name: "weather".into(), keywords: vec![], body: "a".into() },
            Skill { name: "reminders".into(), keywords: vec!["todo".into()], body: "b".into() },
        ];
        let matched = matching_skills(&skills, "add this to my todo list");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "reminders");
    }

    #[test]
    fn parse_skill_md_falls_back_without_frontmatter() {
        let skill = parse_skill_md("plain", "just a body, no frontmatter");
        assert_eq!(skill.name, "plain");
        assert!(skill.keywords.is_empty());
    }
}
