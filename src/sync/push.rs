//! Push orchestrator
//!
//! Snapshots the local tree, diffs it against tracked state, and hands each
//! adapter the slice of the change set under its root. Item failures are
//! counted by the adapters and never stop siblings. After all adapters run,
//! outside dry-run, state is replaced wholesale with the local snapshot: the
//! local tree is the source of truth a push declares.

use std::path::Path;

use crate::adapters::{all_adapters, ApplyReport};
use crate::error::SyncResult;
use crate::gateway::Gateway;
use crate::ignore::IgnoreRules;
use crate::state::ChecksumState;
use crate::sync::snapshot::{detect_changes, local_snapshot};

pub struct PushOrchestrator<'a> {
    gateway: &'a dyn Gateway,
    workdir: &'a Path,
}

impl<'a> PushOrchestrator<'a> {
    pub fn new(gateway: &'a dyn Gateway, workdir: &'a Path) -> Self {
        Self { gateway, workdir }
    }

    pub fn run(
        &self,
        state: &mut ChecksumState,
        ignore: &IgnoreRules,
        dry_run: bool,
    ) -> SyncResult<ApplyReport> {
        let snapshot = local_snapshot(self.workdir, ignore)?;
        let changes = detect_changes(&snapshot, state);
        if changes.is_empty() {
            tracing::info!("nothing to push, local tree matches tracked state");
            return Ok(ApplyReport::default());
        }
        tracing::info!(
            changes = changes.changed.len(),
            deletions = changes.deleted.len(),
            dry_run,
            "pushing local changes"
        );

        let mut report = ApplyReport::default();
        for adapter in all_adapters() {
            let plan = changes.plan_for(adapter.root());
            if plan.is_empty() {
                continue;
            }
            report.absorb(adapter.apply_changes(self.gateway, self.workdir, &plan, dry_run));
        }

        if dry_run {
            tracing::info!(
                would_apply = report.applied,
                "dry run complete, state untouched"
            );
            return Ok(report);
        }

        state.replace(snapshot);
        state.save()?;
        tracing::info!(
            applied = report.applied,
            failed = report.failed,
            skipped = report.skipped,
            "push complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockGateway;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn push_applies_changes_and_replaces_state() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("components/Object")).unwrap();
        fs::write(dir.path().join("components/Object/foo.mdl"), "X").unwrap();

        let mut state = ChecksumState::load(dir.path()).unwrap();
        state.set("components/Object/stale.mdl", "zzz");

        let gateway = MockGateway::new();
        gateway.enqueue(
            "POST /api/v26.1/mdl/execute",
            200,
            json!({"responseStatus": "SUCCESS"}),
        );

        let report = PushOrchestrator::new(&gateway, dir.path())
            .run(&mut state, &IgnoreRules::empty(), false)
            .unwrap();
        // One create plus one drop, batched into a single script
        assert_eq!(report.applied, 2);
        assert_eq!(gateway.request_count(), 1);

        // State now mirrors the local snapshot exactly
        assert_eq!(state.len(), 1);
        assert_eq!(
            state.get("components/Object/foo.mdl"),
            Some("02129bb861061d1a052c592e2dc6b383")
        );
        assert_eq!(state.get("components/Object/stale.mdl"), None);
    }

    #[test]
    fn push_spans_multiple_adapters() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("components/Object")).unwrap();
        fs::create_dir_all(dir.path().join("javasdk/com/example")).unwrap();
        fs::write(dir.path().join("components/Object/foo.mdl"), "X").unwrap();
        fs::write(dir.path().join("javasdk/com/example/Foo.java"), "class Foo {}").unwrap();

        let mut state = ChecksumState::load(dir.path()).unwrap();
        let gateway = MockGateway::new();
        gateway.enqueue(
            "POST /api/v26.1/mdl/execute",
            200,
            json!({"responseStatus": "SUCCESS"}),
        );
        gateway.enqueue(
            "PUT /api/v26.1/code/com.example.Foo",
            200,
            json!({"responseStatus": "SUCCESS"}),
        );

        let report = PushOrchestrator::new(&gateway, dir.path())
            .run(&mut state, &IgnoreRules::empty(), false)
            .unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn failed_item_does_not_block_state_of_siblings() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("javasdk/com")).unwrap();
        fs::write(dir.path().join("javasdk/com/Bad.java"), "x").unwrap();
        fs::write(dir.path().join("javasdk/com/Good.java"), "y").unwrap();

        let mut state = ChecksumState::load(dir.path()).unwrap();
        let gateway = MockGateway::new();
        gateway.enqueue(
            "PUT /api/v26.1/code/com.Bad",
            500,
            json!({"responseStatus": "FAILURE"}),
        );
        gateway.enqueue(
            "PUT /api/v26.1/code/com.Good",
            200,
            json!({"responseStatus": "SUCCESS"}),
        );

        let report = PushOrchestrator::new(&gateway, dir.path())
            .run(&mut state, &IgnoreRules::empty(), false)
            .unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn dry_run_touches_neither_remote_nor_state() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("components/Object")).unwrap();
        fs::write(dir.path().join("components/Object/foo.mdl"), "X").unwrap();

        let mut state = ChecksumState::load(dir.path()).unwrap();
        let gateway = MockGateway::new();

        let report = PushOrchestrator::new(&gateway, dir.path())
            .run(&mut state, &IgnoreRules::empty(), true)
            .unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(gateway.request_count(), 0);
        assert!(state.is_empty());
        assert!(!dir.path().join(crate::state::STATE_FILE).exists());
    }

    #[test]
    fn clean_tree_is_a_noop() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("components/Object")).unwrap();
        fs::write(dir.path().join("components/Object/foo.mdl"), "X").unwrap();

        let mut state = ChecksumState::load(dir.path()).unwrap();
        state.set("components/Object/foo.mdl", "02129bb861061d1a052c592e2dc6b383");

        let gateway = MockGateway::new();
        let report = PushOrchestrator::new(&gateway, dir.path())
            .run(&mut state, &IgnoreRules::empty(), false)
            .unwrap();
        assert_eq!(report, ApplyReport::default());
        assert_eq!(gateway.request_count(), 0);
    }

    #[test]
    fn ignored_files_never_enter_the_plan() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("components/Object")).unwrap();
        fs::write(dir.path().join("components/Object/scratch.bak"), "B").unwrap();

        let mut state = ChecksumState::load(dir.path()).unwrap();
        let ignore = IgnoreRules::from_content(dir.path(), "*.bak\n").unwrap();
        let gateway = MockGateway::new();

        let report = PushOrchestrator::new(&gateway, dir.path())
            .run(&mut state, &ignore, false)
            .unwrap();
        assert_eq!(report, ApplyReport::default());
        assert_eq!(gateway.request_count(), 0);
    }
}
