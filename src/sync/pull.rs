//! Pull orchestrator
//!
//! Merge-then-sweep: every adapter enumerates its remote artifacts first, and
//! only afterwards are tracked paths that no adapter reported deleted locally.
//! An adapter whose enumeration fails is logged and its root is excluded from
//! the sweep, so a flaky endpoint can never wipe a subtree.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::adapters::all_adapters;
use crate::error::SyncResult;
use crate::gateway::Gateway;
use crate::ignore::IgnoreRules;
use crate::state::ChecksumState;

/// Aggregate counts of one pull run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    pub updated: usize,
    pub deleted: usize,
    pub failed_adapters: usize,
}

pub struct PullOrchestrator<'a> {
    gateway: &'a dyn Gateway,
    workdir: &'a Path,
}

impl<'a> PullOrchestrator<'a> {
    pub fn new(gateway: &'a dyn Gateway, workdir: &'a Path) -> Self {
        Self { gateway, workdir }
    }

    pub fn run(
        &self,
        state: &mut ChecksumState,
        ignore: &IgnoreRules,
    ) -> SyncResult<PullReport> {
        let mut report = PullReport::default();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut failed_roots: BTreeSet<&'static str> = BTreeSet::new();

        for adapter in all_adapters() {
            tracing::info!(adapter = adapter.name(), "enumerating remote");
            let files = match adapter.enumerate_remote(self.gateway) {
                Ok(files) => files,
                Err(e) => {
                    tracing::error!(
                        adapter = adapter.name(),
                        error = %e,
                        "remote enumeration failed, excluding root from the sweep"
                    );
                    failed_roots.insert(adapter.root());
                    report.failed_adapters += 1;
                    continue;
                }
            };

            for file in files {
                if ignore.is_ignored(&file.path) {
                    tracing::debug!(path = %file.path, "ignored, not pulled");
                    continue;
                }
                seen.insert(file.path.clone());

                let local = self.workdir.join(&file.path);
                let unchanged = state
                    .get(&file.path)
                    .is_some_and(|tracked| file.checksum.matches_str(tracked))
                    && local.exists();
                if unchanged {
                    tracing::debug!(path = %file.path, "up to date");
                    continue;
                }

                if let Some(parent) = local.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&local, &file.content)?;
                state.set(&file.path, file.checksum.as_str());
                report.updated += 1;
                tracing::info!(path = %file.path, "pulled");
            }
        }

        // Orphan sweep: tracked paths no surviving adapter reported
        for path in state.tracked_paths() {
            if seen.contains(&path) || ignore.is_ignored(&path) {
                continue;
            }
            let root = path.split('/').next().unwrap_or("");
            if failed_roots.iter().any(|r| *r == root) {
                tracing::debug!(path = %path, "root enumeration failed, keeping");
                continue;
            }

            let local = self.workdir.join(&path);
            if local.exists() {
                fs::remove_file(&local)?;
            }
            state.remove(&path);
            report.deleted += 1;
            tracing::info!(path = %path, "deleted locally, gone on remote");
        }

        state.save()?;
        tracing::info!(
            updated = report.updated,
            deleted = report.deleted,
            failed_adapters = report.failed_adapters,
            "pull complete"
        );
        Ok(report)
    }
}
