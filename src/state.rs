//! Checksum State Store
//!
//! The persisted path-to-hash map that is the adapter-independent source of
//! truth for "already synchronized". Stored as one JSON object in
//! `.vaultsync-state.json`, keyed by canonical relative path. Loaded once per
//! command and persisted once at command end; a missing backing file means
//! empty state, not an error.
//!
//! A `fs2` advisory lock on a sidecar file guards against two commands
//! mutating state concurrently.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{SyncError, SyncResult};

/// State file name, relative to the working directory
pub const STATE_FILE: &str = ".vaultsync-state.json";

const LOCK_FILE: &str = ".vaultsync-state.lock";

/// Persistent path → content-hash map
#[derive(Debug)]
pub struct ChecksumState {
    entries: BTreeMap<String, String>,
    backing: PathBuf,
    // Held for the lifetime of the state; released on drop.
    _lock: File,
}

impl ChecksumState {
    /// Load state from `dir`, acquiring the command-scoped lock.
    ///
    /// A missing state file yields empty state.
    pub fn load(dir: &Path) -> SyncResult<Self> {
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(dir.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .map_err(|_| SyncError::StateLocked)?;

        let backing = dir.join(STATE_FILE);
        let entries = if backing.exists() {
            let content = fs::read_to_string(&backing)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            entries,
            backing,
            _lock: lock,
        })
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn set(&mut self, path: impl Into<String>, hash: impl Into<String>) {
        self.entries.insert(path.into(), hash.into());
    }

    pub fn remove(&mut self, path: &str) {
        self.entries.remove(path);
    }

    /// All tracked paths, in sorted order
    pub fn tracked_paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Replace the entire state with a fresh snapshot
    pub fn replace(&mut self, entries: BTreeMap<String, String>) {
        self.entries = entries;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist the current map to the backing file
    pub fn save(&self) -> SyncResult<()> {
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.backing, content)?;
        Ok(())
    }

    /// Delete the backing file, forcing full re-detection on the next run.
    ///
    /// Used by `clean`; does not touch working files.
    pub fn clear_backing(dir: &Path) -> SyncResult<bool> {
        let backing = dir.join(STATE_FILE);
        if backing.exists() {
            fs::remove_file(backing)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let state = ChecksumState::load(dir.path()).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        {
            let mut state = ChecksumState::load(dir.path()).unwrap();
            state.set("components/Object/foo.mdl", "abc123");
            state.set("javasdk/com/example/Foo.java", "def456");
            state.save().unwrap();
        }

        let state = ChecksumState::load(dir.path()).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("components/Object/foo.mdl"), Some("abc123"));
        assert_eq!(state.get("javasdk/com/example/Foo.java"), Some("def456"));
    }

    #[test]
    fn remove_untracks_path() {
        let dir = tempdir().unwrap();
        let mut state = ChecksumState::load(dir.path()).unwrap();
        state.set("components/Object/foo.mdl", "abc");
        state.remove("components/Object/foo.mdl");
        assert_eq!(state.get("components/Object/foo.mdl"), None);
    }

    #[test]
    fn replace_swaps_full_snapshot() {
        let dir = tempdir().unwrap();
        let mut state = ChecksumState::load(dir.path()).unwrap();
        state.set("components/Object/old.mdl", "aaa");

        let mut snapshot = BTreeMap::new();
        snapshot.insert("components/Object/new.mdl".to_string(), "bbb".to_string());
        state.replace(snapshot);

        assert_eq!(state.get("components/Object/old.mdl"), None);
        assert_eq!(state.get("components/Object/new.mdl"), Some("bbb"));
    }

    #[test]
    fn tracked_paths_are_sorted() {
        let dir = tempdir().unwrap();
        let mut state = ChecksumState::load(dir.path()).unwrap();
        state.set("translations/de/general.csv", "1");
        state.set("components/Object/a.mdl", "2");
        let paths = state.tracked_paths();
        assert_eq!(
            paths,
            vec!["components/Object/a.mdl", "translations/de/general.csv"]
        );
    }

    #[test]
    fn second_load_fails_while_locked() {
        let dir = tempdir().unwrap();
        let _held = ChecksumState::load(dir.path()).unwrap();
        let err = ChecksumState::load(dir.path()).unwrap_err();
        assert!(matches!(err, SyncError::StateLocked));
    }

    #[test]
    fn clear_backing_removes_state_file() {
        let dir = tempdir().unwrap();
        {
            let mut state = ChecksumState::load(dir.path()).unwrap();
            state.set("components/Object/foo.mdl", "abc");
            state.save().unwrap();
        }
        assert!(ChecksumState::clear_backing(dir.path()).unwrap());
        assert!(!ChecksumState::clear_backing(dir.path()).unwrap());

        let state = ChecksumState::load(dir.path()).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn state_file_is_plain_json_object() {
        let dir = tempdir().unwrap();
        {
            let mut state = ChecksumState::load(dir.path()).unwrap();
            state.set("components/Object/foo.mdl", "abc123");
            state.save().unwrap();
        }
        let content = fs::read_to_string(dir.path().join(STATE_FILE)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["components/Object/foo.mdl"], "abc123");
    }
}
