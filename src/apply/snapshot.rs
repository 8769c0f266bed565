//! Snapshot & restore (spec.md §4.J).
//!
//! Restore is whole-subtree replacement: anything present in the workspace
//! but absent from the snapshot is deleted, not just overwritten. The one
//! wrinkle the original didn't have to deal with: `intelligence` is itself
//! a watched subtree, but `intelligence/applied/` is where snapshots live —
//! naively mirroring it would either recurse into the snapshot being
//! created, or delete every prior snapshot (including the one a rollback is
//! restoring from) during a restore's deletion pass. Both `create_snapshot`
//! and `restore_snapshot` exclude the `applied` entry when processing
//! `intelligence`, leaving it a self-contained, append-only audit trail
//! outside the snapshot/restore invariant.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::CairnError;

const SNAPSHOT_DIRS: &[&str] = &[
    "decisions",
    "tasks",
    "entities",
    "summaries",
    "intelligence",
    "memory",
    "maintenance",
];
const SNAPSHOT_FILES: &[&str] = &["AGENTS.md", "MEMORY.md", "IDENTITY.md"];

fn copy_file_preserving_mtime(src: &Path, dst: &Path) -> Result<(), CairnError> {
    fs::copy(src, dst)?;
    let mtime = fs::metadata(src)?.modified()?;
    fs::File::open(dst)?.set_modified(mtime)?;
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path, exclude: &[&str]) -> Result<(), CairnError> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|e| name == std::ffi::OsStr::new(e)) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        if entry.file_type()?.is_dir() {
            copy_tree(&src_path, &dst_path, &[])?;
        } else {
            copy_file_preserving_mtime(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Mirror `src` onto `dst`: entries in `dst` not present in `src` are
/// deleted (recursively), entries in `src` are copied or recursed into.
/// `exclude`d top-level names in `dst` are left untouched.
fn mirror_tree(src: &Path, dst: &Path, exclude: &[&str]) -> Result<(), CairnError> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(dst)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|e| name == std::ffi::OsStr::new(e)) {
            continue;
        }
        if !src.join(&name).exists() {
            let dst_path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&dst_path)?;
            } else {
                fs::remove_file(&dst_path)?;
            }
        }
    }

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        if entry.file_type()?.is_dir() {
            mirror_tree(&src_path, &dst_path, &[])?;
        } else {
            copy_file_preserving_mtime(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Create `intelligence/applied/<ts>/` under `root` and copy the watched
/// subtrees and top-level files into it.
pub fn create_snapshot(root: &Path, ts: &str) -> Result<PathBuf, CairnError> {
    let snap_dir = root.join("intelligence").join("applied").join(ts);
    fs::create_dir_all(&snap_dir)?;

    for &dir in SNAPSHOT_DIRS {
        let src = root.join(dir);
        if src.is_dir() {
            let exclude: &[&str] = if dir == "intelligence" { &["applied"] } else { &[] };
            copy_tree(&src, &snap_dir.join(dir), exclude)?;
        }
    }
    for &file in SNAPSHOT_FILES {
        let src = root.join(file);
        if src.is_file() {
            copy_file_preserving_mtime(&src, &snap_dir.join(file))?;
        }
    }

    Ok(snap_dir)
}

/// Restore `root`'s watched subtrees from `snap_dir`, deleting anything
/// created since the snapshot was taken.
pub fn restore_snapshot(root: &Path, snap_dir: &Path) -> Result<(), CairnError> {
    for &dir in SNAPSHOT_DIRS {
        let src = snap_dir.join(dir);
        if src.is_dir() {
            let exclude: &[&str] = if dir == "intelligence" { &["applied"] } else { &[] };
            mirror_tree(&src, &root.join(dir), exclude)?;
        }
    }
    for &file in SNAPSHOT_FILES {
        let src = snap_dir.join(file);
        if src.is_file() {
            copy_file_preserving_mtime(&src, &root.join(file))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn restore_deletes_files_created_after_snapshot() {
        let td = tempdir().unwrap();
        write(td.path(), "decisions/DECISIONS.md", "[D-1]\nStatement: a\n");
        let snap = create_snapshot(td.path(), "20260213-090000").unwrap();

        write(td.path(), "decisions/DECISIONS.md", "[D-1]\nStatement: a\n\n[D-2]\nStatement: b\n");
        write(td.path(), "decisions/NEW_FILE.md", "unexpected");

        restore_snapshot(td.path(), &snap).unwrap();

        let content = fs::read_to_string(td.path().join("decisions/DECISIONS.md")).unwrap();
        assert_eq!(content, "[D-1]\nStatement: a\n");
        assert!(!td.path().join("decisions/NEW_FILE.md").exists());
    }

    #[test]
    fn snapshot_excludes_prior_applied_directory() {
        let td = tempdir().unwrap();
        write(td.path(), "decisions/DECISIONS.md", "[D-1]\nStatement: a\n");
        let first = create_snapshot(td.path(), "20260213-090000").unwrap();
        assert!(first.exists());

        let second = create_snapshot(td.path(), "20260213-091000").unwrap();
        assert!(!second.join("intelligence/applied").exists());
    }

    #[test]
    fn restore_does_not_delete_other_snapshots() {
        let td = tempdir().unwrap();
        write(td.path(), "decisions/DECISIONS.md", "[D-1]\nStatement: a\n");
        let first = create_snapshot(td.path(), "20260213-090000").unwrap();

        write(td.path(), "decisions/DECISIONS.md", "[D-1]\nStatement: a\n\n[D-2]\nStatement: b\n");
        let second = create_snapshot(td.path(), "20260213-091000").unwrap();

        restore_snapshot(td.path(), &first).unwrap();

        assert!(second.exists());
    }

    #[test]
    fn preserves_file_modification_time() {
        let td = tempdir().unwrap();
        write(td.path(), "AGENTS.md", "hello");
        let src_mtime = fs::metadata(td.path().join("AGENTS.md")).unwrap().modified().unwrap();
        let snap = create_snapshot(td.path(), "20260213-090000").unwrap();
        let snap_mtime = fs::metadata(snap.join("AGENTS.md")).unwrap().modified().unwrap();
        assert_eq!(src_mtime, snap_mtime);
    }
}
