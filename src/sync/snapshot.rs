//! Local snapshot and change detection
//!
//! Walks the four tracked roots, hashes every non-ignored file, and compares
//! the result against the persisted checksum state. The change predicate is
//! shared by push, package, and patch so all three agree on what "changed"
//! means.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};

use crate::adapters::{AdapterPlan, MDL_ROOT, TRACKED_ROOTS};
use crate::checksum::Checksum;
use crate::error::SyncResult;
use crate::ignore::IgnoreRules;
use crate::state::ChecksumState;

/// Render a workdir-relative path in canonical form: forward slashes on every
/// platform.
pub fn canonical_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Hash every non-ignored file under the tracked roots.
///
/// Roots that do not exist locally contribute nothing. The result is the
/// full-snapshot replacement a successful push persists.
pub fn local_snapshot(
    workdir: &Path,
    ignore: &IgnoreRules,
) -> SyncResult<BTreeMap<String, String>> {
    fn walk(
        dir: &Path,
        workdir: &Path,
        ignore: &IgnoreRules,
        out: &mut BTreeMap<String, String>,
    ) -> SyncResult<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path, workdir, ignore, out)?;
                continue;
            }
            let rel = canonical_path(path.strip_prefix(workdir).unwrap_or(&path));
            if ignore.is_ignored(&rel) {
                tracing::debug!(path = %rel, "ignored");
                continue;
            }
            let content = fs::read(&path)?;
            out.insert(rel, Checksum::of_bytes(&content).into_string());
        }
        Ok(())
    }

    let mut snapshot = BTreeMap::new();
    for root in TRACKED_ROOTS {
        let root_dir = workdir.join(root);
        if root_dir.is_dir() {
            walk(&root_dir, workdir, ignore, &mut snapshot)?;
        }
    }
    Ok(snapshot)
}

/// How one path differs between the local snapshot and the tracked state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Deleted,
}

/// All detected differences, path-sorted within each kind
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub changed: Vec<(String, Change)>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }

    pub fn total(&self) -> usize {
        self.changed.len() + self.deleted.len()
    }

    /// The subset belonging to one adapter root
    pub fn plan_for(&self, root: &str) -> AdapterPlan {
        let prefix = format!("{}/", root);
        AdapterPlan {
            changed: self
                .changed
                .iter()
                .filter(|(path, _)| path.starts_with(&prefix))
                .map(|(path, _)| path.clone())
                .collect(),
            deleted: self
                .deleted
                .iter()
                .filter(|path| path.starts_with(&prefix))
                .cloned()
                .collect(),
        }
    }

    /// Changed (created or updated) paths under the MDL root, sorted.
    ///
    /// Package and patch both scope to this subset; sorted order keeps the
    /// package layout deterministic.
    pub fn changed_mdl_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .changed
            .iter()
            .filter(|(path, _)| path.starts_with(&format!("{}/", MDL_ROOT)))
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }
}

/// Compare a local snapshot against tracked state.
///
/// Untracked ⇒ created; tracked with a different hash ⇒ updated; tracked but
/// absent from the snapshot ⇒ deleted. Hash equality suppresses the path
/// entirely.
pub fn detect_changes(snapshot: &BTreeMap<String, String>, state: &ChecksumState) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (path, hash) in snapshot {
        match state.get(path) {
            None => changes.changed.push((path.clone(), Change::Created)),
            Some(tracked) if tracked != hash => {
                changes.changed.push((path.clone(), Change::Updated));
            }
            Some(_) => {}
        }
    }
    for path in state.tracked_paths() {
        if !snapshot.contains_key(&path) {
            changes.deleted.push(path);
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn canonical_paths_use_forward_slashes() {
        let rel = Path::new("components").join("Object").join("foo.mdl");
        assert_eq!(canonical_path(&rel), "components/Object/foo.mdl");
    }

    #[test]
    fn snapshot_walks_only_tracked_roots() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("components/Object")).unwrap();
        fs::create_dir_all(dir.path().join("unrelated")).unwrap();
        fs::write(dir.path().join("components/Object/foo.mdl"), "X").unwrap();
        fs::write(dir.path().join("unrelated/file.txt"), "nope").unwrap();
        fs::write(dir.path().join("stray.txt"), "nope").unwrap();

        let snapshot = local_snapshot(dir.path(), &IgnoreRules::empty()).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot.get("components/Object/foo.mdl").map(String::as_str),
            Some("02129bb861061d1a052c592e2dc6b383")
        );
    }

    #[test]
    fn snapshot_respects_ignore_rules() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("components/Object")).unwrap();
        fs::write(dir.path().join("components/Object/keep.mdl"), "a").unwrap();
        fs::write(dir.path().join("components/Object/skip.bak"), "b").unwrap();

        let ignore = IgnoreRules::from_content(dir.path(), "*.bak\n").unwrap();
        let snapshot = local_snapshot(dir.path(), &ignore).unwrap();
        assert!(snapshot.contains_key("components/Object/keep.mdl"));
        assert!(!snapshot.contains_key("components/Object/skip.bak"));
    }

    #[test]
    fn change_detection_classifies_all_kinds() {
        let dir = tempdir().unwrap();
        let mut state = ChecksumState::load(dir.path()).unwrap();
        state.set("components/Object/same.mdl", "aaa");
        state.set("components/Object/stale.mdl", "old");
        state.set("components/Object/gone.mdl", "zzz");

        let mut snapshot = BTreeMap::new();
        snapshot.insert("components/Object/same.mdl".to_string(), "aaa".to_string());
        snapshot.insert("components/Object/stale.mdl".to_string(), "new".to_string());
        snapshot.insert("components/Object/fresh.mdl".to_string(), "bbb".to_string());

        let changes = detect_changes(&snapshot, &state);
        assert_eq!(
            changes.changed,
            vec![
                ("components/Object/fresh.mdl".to_string(), Change::Created),
                ("components/Object/stale.mdl".to_string(), Change::Updated),
            ]
        );
        assert_eq!(changes.deleted, vec!["components/Object/gone.mdl"]);
    }

    #[test]
    fn unchanged_tree_yields_empty_changeset() {
        let dir = tempdir().unwrap();
        let mut state = ChecksumState::load(dir.path()).unwrap();
        state.set("components/Object/foo.mdl", "aaa");

        let mut snapshot = BTreeMap::new();
        snapshot.insert("components/Object/foo.mdl".to_string(), "aaa".to_string());

        assert!(detect_changes(&snapshot, &state).is_empty());
    }

    #[test]
    fn plans_partition_by_root() {
        let changes = ChangeSet {
            changed: vec![
                ("components/Object/foo.mdl".to_string(), Change::Updated),
                ("javasdk/com/Foo.java".to_string(), Change::Created),
            ],
            deleted: vec!["custom_pages/portal/app.js".to_string()],
        };

        let mdl = changes.plan_for("components");
        assert_eq!(mdl.changed, vec!["components/Object/foo.mdl"]);
        assert!(mdl.deleted.is_empty());

        let bundle = changes.plan_for("custom_pages");
        assert!(bundle.changed.is_empty());
        assert_eq!(bundle.deleted, vec!["custom_pages/portal/app.js"]);

        assert!(changes.plan_for("translations").is_empty());
    }

    #[test]
    fn changed_mdl_paths_exclude_other_roots_and_deletions() {
        let changes = ChangeSet {
            changed: vec![
                ("components/Object/b.mdl".to_string(), Change::Updated),
                ("components/Object/a.mdl".to_string(), Change::Created),
                ("javasdk/com/Foo.java".to_string(), Change::Created),
            ],
            deleted: vec!["components/Object/gone.mdl".to_string()],
        };
        assert_eq!(
            changes.changed_mdl_paths(),
            vec!["components/Object/a.mdl", "components/Object/b.mdl"]
        );
    }
}
