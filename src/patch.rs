//! Patch generator
//!
//! Renders the locally changed MDL components as one unified diff against
//! their current remote definitions. Shares the change predicate with push,
//! scoped to the MDL root. A component whose remote original cannot be
//! fetched is warned about and excluded rather than failing the run.
//!
//! The alternative JSON mode materializes each remote original into a
//! temporary file and emits a machine-readable list of original/modified
//! pairs for external diff tooling.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use similar::TextDiff;

use crate::adapters::mdl::ComponentRef;
use crate::adapters::query_records;
use crate::error::SyncResult;
use crate::gateway::Gateway;
use crate::ignore::IgnoreRules;
use crate::state::ChecksumState;
use crate::sync::snapshot::{detect_changes, local_snapshot};

/// One changed component with both sides of its diff in memory
#[derive(Debug, Clone)]
pub struct PatchPair {
    pub path: String,
    pub original: String,
    pub modified: String,
}

/// JSON-mode manifest entry pointing at on-disk files
#[derive(Debug, Serialize)]
pub struct PatchFileEntry {
    pub file_path: String,
    pub original_file: String,
    pub modified_file: String,
}

pub struct PatchGenerator<'a> {
    gateway: &'a dyn Gateway,
    workdir: &'a Path,
}

impl<'a> PatchGenerator<'a> {
    pub fn new(gateway: &'a dyn Gateway, workdir: &'a Path) -> Self {
        Self { gateway, workdir }
    }

    /// Collect diffable pairs for every changed MDL file whose remote
    /// original is fetchable.
    pub fn collect(
        &self,
        state: &ChecksumState,
        ignore: &IgnoreRules,
    ) -> SyncResult<Vec<PatchPair>> {
        let snapshot = local_snapshot(self.workdir, ignore)?;
        let changed = detect_changes(&snapshot, state).changed_mdl_paths();
        if changed.is_empty() {
            tracing::info!("no changed MDL components to diff");
            return Ok(Vec::new());
        }

        let mut pairs = Vec::with_capacity(changed.len());
        for path in changed {
            let component = match ComponentRef::from_path(&path) {
                Ok(component) => component,
                Err(e) => {
                    tracing::warn!(path, error = %e, "not a component path, excluding from patch");
                    continue;
                }
            };
            let original = match self.fetch_original(&component) {
                Ok(Some(original)) => original,
                Ok(None) => {
                    tracing::warn!(
                        component = %component.qualified(),
                        "no remote original, excluding from patch"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        component = %component.qualified(),
                        error = %e,
                        "failed to fetch remote original, excluding from patch"
                    );
                    continue;
                }
            };
            let modified = fs::read_to_string(self.workdir.join(&path))?;
            pairs.push(PatchPair {
                path,
                original,
                modified,
            });
        }
        Ok(pairs)
    }

    fn fetch_original(&self, component: &ComponentRef) -> SyncResult<Option<String>> {
        let records = query_records(
            self.gateway,
            &format!(
                "SELECT mdl_definition__v FROM vault_component__v \
                 WHERE component_type__sys = '{}' AND component_name__sys = '{}'",
                component.component_type, component.name
            ),
        )?;
        Ok(records
            .first()
            .and_then(|r| {
                r.get("mdl_definition__v")
                    .or_else(|| r.get("mdl_definition__sys"))
            })
            .and_then(serde_json::Value::as_str)
            .map(str::to_string))
    }
}

/// Concatenated unified diff over all pairs, 3 context lines, `a/` and `b/`
/// headers.
pub fn render_patch(pairs: &[PatchPair]) -> String {
    let mut patch = String::new();
    for pair in pairs {
        let diff = TextDiff::from_lines(&pair.original, &pair.modified);
        patch.push_str(
            &diff
                .unified_diff()
                .context_radius(3)
                .header(&format!("a/{}", pair.path), &format!("b/{}", pair.path))
                .to_string(),
        );
    }
    patch
}

/// Write each original to a kept temporary file and render the JSON manifest.
pub fn render_json_manifest(workdir: &Path, pairs: &[PatchPair]) -> SyncResult<String> {
    let mut entries = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let mut temp = tempfile::Builder::new()
            .prefix("vaultsync-original-")
            .suffix(".mdl")
            .tempfile()?;
        temp.write_all(pair.original.as_bytes())?;
        let (_, original_path) = temp.keep().map_err(|e| e.error)?;

        entries.push(PatchFileEntry {
            file_path: pair.path.clone(),
            original_file: original_path.to_string_lossy().into_owned(),
            modified_file: workdir.join(&pair.path).to_string_lossy().into_owned(),
        });
    }
    Ok(serde_json::to_string_pretty(&entries)?)
}
