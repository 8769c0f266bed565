//! Shared path-safety resolver.
//!
//! Every write (and namespace-gated read) in Cairn goes through `resolve`,
//! which turns a workspace-relative string into an absolute path guaranteed
//! to live under the workspace root — or refuses it. This is the single
//! chokepoint invariant 6 (spec §3) depends on: "No op may resolve to a
//! filesystem path outside the workspace root."
//!
//! Absolute paths and any `..` path segment are rejected syntactically,
//! before any filesystem access. Symlink escapes are caught by resolving the
//! longest existing ancestor with `fs::canonicalize` (the `realpath`
//! equivalent) and checking it is still prefixed by the canonical root —
//! this also lets ops address files that do not exist yet (a fresh corpus
//! file that hasn't been created), as long as every *existing* ancestor
//! stays inside the root.

use crate::core::error::CairnError;
use std::path::{Component, Path, PathBuf};

/// Resolve `rel` against `root`, refusing anything that could escape it.
///
/// `rel` must be a workspace-relative path (e.g. `"decisions/DECISIONS.md"`).
/// Returns the canonical absolute path on success.
pub fn resolve(root: &Path, rel: &str) -> Result<PathBuf, CairnError> {
    let rel_path = Path::new(rel);

    if rel_path.is_absolute() {
        return Err(CairnError::Path(format!(
            "absolute path not allowed: {rel}"
        )));
    }
    if rel_path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(CairnError::Path(format!(
            "path traversal not allowed: {rel}"
        )));
    }

    let root_canon = root
        .canonicalize()
        .map_err(|e| CairnError::Path(format!("workspace root {}: {e}", root.display())))?;

    let candidate = root_canon.join(rel_path);

    // Walk up to the longest existing ancestor, collecting the components
    // that don't exist yet so we can re-append them after canonicalizing.
    let mut existing = candidate.clone();
    let mut pending: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        let name = existing.file_name().map(|n| n.to_os_string());
        match existing.parent() {
            Some(parent) => {
                if let Some(name) = name {
                    pending.push(name);
                }
                existing = parent.to_path_buf();
            }
            None => break,
        }
    }

    let existing_canon = existing
        .canonicalize()
        .map_err(|e| CairnError::Path(format!("cannot resolve {rel}: {e}")))?;
    if !existing_canon.starts_with(&root_canon) {
        return Err(CairnError::Path(format!(
            "path traversal not allowed (symlink escape): {rel}"
        )));
    }

    let mut resolved = existing_canon;
    for part in pending.into_iter().rev() {
        resolved.push(part);
    }
    if !resolved.starts_with(&root_canon) {
        return Err(CairnError::Path(format!(
            "path traversal not allowed: {rel}"
        )));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    #[cfg(unix)]
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    #[test]
    fn normal_path_resolves() {
        let td = tempdir().unwrap();
        let target = td.path().join("decisions");
        fs::create_dir(&target).unwrap();
        let result = resolve(td.path(), "decisions").unwrap();
        assert_eq!(result, target.canonicalize().unwrap());
    }

    #[test]
    fn rejects_traversal() {
        let td = tempdir().unwrap();
        let err = resolve(td.path(), "../../../etc/passwd").unwrap_err();
        assert!(format!("{err}").contains("traversal"));
    }

    #[test]
    fn rejects_absolute_path() {
        let td = tempdir().unwrap();
        let err = resolve(td.path(), "/etc/passwd").unwrap_err();
        assert!(format!("{err}").contains("absolute"));
    }

    #[test]
    fn rejects_dotdot_in_middle() {
        let td = tempdir().unwrap();
        let err = resolve(td.path(), "decisions/../../../etc/passwd").unwrap_err();
        assert!(format!("{err}").contains("traversal"));
    }

    #[test]
    #[cfg(unix)]
    fn rejects_symlink_escape() {
        let td = tempdir().unwrap();
        let link_path = td.path().join("escape_link");
        symlink("/tmp", &link_path).unwrap();
        let err = resolve(td.path(), "escape_link/should_fail").unwrap_err();
        assert!(format!("{err}").contains("traversal"));
    }

    #[test]
    #[cfg(unix)]
    fn allows_internal_symlink() {
        let td = tempdir().unwrap();
        let real_dir = td.path().join("real");
        fs::create_dir(&real_dir).unwrap();
        let link_path = td.path().join("link");
        symlink(&real_dir, &link_path).unwrap();
        let result = resolve(td.path(), "link").unwrap();
        assert_eq!(result, real_dir.canonicalize().unwrap());
    }
}
