// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

/// Resolve a tool-supplied path against the workspace root.
///
/// Relative paths are joined onto `workspace`; absolute paths are used as
/// given. The result is canonicalised when possible (falling back to the
/// joined, non-canonical path when the target does not exist yet — this
/// matters for `write_file` creating a new path). When `restrict` is set,
/// the canonical workspace root must be a prefix of the resolved path,
/// otherwise resolution fails.
pub fn resolve_path(workspace: &Path, requested: &str, restrict: bool) -> Result<PathBuf, String> {
    let requested_path = Path::new(requested);
    let joined = if requested_path.is_absolute() {
        requested_path.to_path_buf()
    } else {
        workspace.join(requested_path)
    };

    let resolved = canonicalize_best_effort(&joined);

    if restrict {
        let workspace_canon = canonicalize_best_effort(workspace);
        if !resolved.starts_with(&workspace_canon) {
            return Err("path outside workspace".to_string());
        }
    }

    Ok(resolved)
}

/// Canonicalise `path`, walking up to the nearest existing ancestor when the
/// path itself (or an intermediate component) does not exist yet, then
/// re-appending the missing tail. This keeps `restrict` checks correct for
/// files that are about to be created.
fn canonicalize_best_effort(path: &Path) -> PathBuf {
    if let Ok(canon) = path.canonicalize() {
        return canon;
    }
    let mut missing_tail = Vec::new();
    let mut cur = path.to_path_buf();
    loop {
        if let Ok(canon) = cur.canonicalize() {
            let mut result = canon;
            for part in missing_tail.into_iter().rev() {
                result.push(part);
            }
            return result;
        }
        match (cur.file_name().map(|s| s.to_owned()), cur.parent()) {
            (Some(name), Some(parent)) if parent != cur => {
                missing_tail.push(name);
                cur = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolves_relative_path_inside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let resolved = resolve_path(dir.path(), "a.txt", true).unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap().join("a.txt"));
    }

    #[test]
    fn rejects_escape_when_restricted() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_path(dir.path(), "../../etc/passwd", true).unwrap_err();
        assert!(err.contains("outside workspace"));
    }

    #[test]
    fn allows_escape_when_unrestricted() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_path(dir.path(), "/etc/hosts", false);
        assert!(resolved.is_ok());
    }

    #[test]
    fn resolves_nonexistent_file_for_write() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_path(dir.path(), "new/nested/file.txt", true).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
        assert!(resolved.ends_with("new/nested/file.txt"));
    }
}
