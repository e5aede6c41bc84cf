//! MDL component adapter
//!
//! Maps `components/<type>/<name>.mdl` files to the remote's metadata
//! component records. Pull enumerates via the paginated query endpoint; push
//! batches every creation, update, and deletion into one MDL script executed
//! as a single remote call.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::adapters::{
    query_records, record_field, strip_root, AdapterPlan, ApplyReport, ComponentAdapter,
    RemoteFile, MDL_ROOT,
};
use crate::error::{SyncError, SyncResult};
use crate::gateway::{ApiRequest, Body, Gateway};

/// Two-part identity of an MDL-class configuration record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ComponentRef {
    pub component_type: String,
    pub name: String,
}

impl ComponentRef {
    pub fn new(component_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            name: name.into(),
        }
    }

    /// Parse identity from a canonical path `components/<type>/<name>.mdl`.
    ///
    /// Pure path algebra; never touches the filesystem.
    pub fn from_path(path: &str) -> SyncResult<Self> {
        let segments = strip_root(path, MDL_ROOT, "component")?;
        let [component_type, file] = segments.as_slice() else {
            return Err(SyncError::PathIdentity {
                path: path.to_string(),
                kind: "component",
                reason: "expected exactly <type>/<name>.mdl below the root".to_string(),
            });
        };
        let name = file
            .strip_suffix(".mdl")
            .ok_or_else(|| SyncError::PathIdentity {
                path: path.to_string(),
                kind: "component",
                reason: "missing .mdl extension".to_string(),
            })?;
        if component_type.is_empty() || name.is_empty() {
            return Err(SyncError::PathIdentity {
                path: path.to_string(),
                kind: "component",
                reason: "empty type or name segment".to_string(),
            });
        }
        Ok(Self::new(*component_type, name))
    }

    /// Inverse of [`ComponentRef::from_path`]
    pub fn to_path(&self) -> String {
        format!("{}/{}/{}.mdl", MDL_ROOT, self.component_type, self.name)
    }

    /// `Type.name`, the remote's qualified spelling
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.component_type, self.name)
    }
}

/// The MDL definition field keeps its historical `__v` spelling even on
/// servers that moved identity fields to `__sys`.
fn definition_of(record: &Value) -> Option<&str> {
    record
        .get("mdl_definition__v")
        .or_else(|| record.get("mdl_definition__sys"))
        .and_then(Value::as_str)
}

/// Render the batched push script: one create-or-update statement per change,
/// one drop statement per deletion.
pub fn build_script(changes: &[String], deletions: &[ComponentRef]) -> String {
    let mut script = String::new();
    for body in changes {
        script.push_str("CREATE OR UPDATE COMPONENT \n");
        script.push_str(body);
        script.push_str("\n;\n");
    }
    for component in deletions {
        script.push_str(&format!(
            "DROP COMPONENT {}.\"{}\";\n",
            component.component_type, component.name
        ));
    }
    script
}

pub struct MdlAdapter;

impl ComponentAdapter for MdlAdapter {
    fn name(&self) -> &'static str {
        "mdl"
    }

    fn root(&self) -> &'static str {
        MDL_ROOT
    }

    fn enumerate_remote(&self, gateway: &dyn Gateway) -> SyncResult<Vec<RemoteFile>> {
        let records = query_records(
            gateway,
            "SELECT component_name__sys, component_type__sys, mdl_definition__v \
             FROM vault_component__v",
        )?;

        let mut files = Vec::with_capacity(records.len());
        for record in &records {
            let (Some(component_type), Some(name)) = (
                record_field(record, "component_type"),
                record_field(record, "component_name"),
            ) else {
                tracing::warn!("skipping component record without identity fields");
                continue;
            };
            let definition = definition_of(record).unwrap_or_default();
            let component = ComponentRef::new(component_type, name);
            files.push(RemoteFile::new(
                component.to_path(),
                definition.as_bytes().to_vec(),
            ));
        }
        Ok(files)
    }

    fn apply_changes(
        &self,
        gateway: &dyn Gateway,
        workdir: &Path,
        plan: &AdapterPlan,
        dry_run: bool,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        if plan.is_empty() {
            return report;
        }
        tracing::info!(
            changes = plan.changed.len(),
            deletions = plan.deleted.len(),
            "processing MDL updates"
        );

        let mut bodies = Vec::new();
        for path in &plan.changed {
            match fs::read_to_string(workdir.join(path)) {
                Ok(content) => bodies.push(content),
                Err(e) => {
                    tracing::error!(path, error = %e, "failed to read component file");
                    report.failed += 1;
                }
            }
        }

        let mut drops = Vec::new();
        for path in &plan.deleted {
            match ComponentRef::from_path(path) {
                Ok(component) => drops.push(component),
                Err(e) => {
                    tracing::error!(path, error = %e, "cannot derive component identity");
                    report.failed += 1;
                }
            }
        }

        if bodies.is_empty() && drops.is_empty() {
            return report;
        }
        let script = build_script(&bodies, &drops);

        if dry_run {
            tracing::info!("[dry run] MDL script to be executed:\n{}", script);
            report.applied += bodies.len() + drops.len();
            return report;
        }

        let endpoint = gateway.api_path("mdl/execute");
        let request = ApiRequest::post(
            &endpoint,
            Body::Raw {
                content_type: "text/plain",
                bytes: script.into_bytes(),
            },
        );
        let outcome = gateway
            .request(&request)
            .and_then(|response| response.ensure_ok(&endpoint));
        match outcome {
            Ok(()) => {
                tracing::info!("MDL script executed successfully");
                report.applied += bodies.len() + drops.len();
            }
            Err(e) => {
                tracing::error!(error = %e, "MDL script execution failed");
                report.failed += bodies.len() + drops.len();
            }
        }
        report
    }
}
