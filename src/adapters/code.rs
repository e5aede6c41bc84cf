//! SDK code adapter
//!
//! Maps `javasdk/<package/path>/<Name>.java` files to the remote's code
//! components, addressed by their dot-qualified class name. The remote API
//! has no code deletion; deletions are reported as skipped and never
//! attempted.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::adapters::{
    query_records, record_field, strip_root, AdapterPlan, ApplyReport, ComponentAdapter,
    RemoteFile, CODE_ROOT,
};
use crate::error::{SyncError, SyncResult};
use crate::gateway::{ApiRequest, Body, Gateway};

/// Dot-qualified class name, the remote identity of a code component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRef {
    pub qualified: String,
}

impl ClassRef {
    pub fn new(qualified: impl Into<String>) -> Self {
        Self {
            qualified: qualified.into(),
        }
    }

    /// Parse identity from a canonical path: separators become the qualifier
    /// delimiter, the extension is stripped.
    pub fn from_path(path: &str) -> SyncResult<Self> {
        let segments = strip_root(path, CODE_ROOT, "code")?;
        let (file, packages) = segments.split_last().ok_or_else(|| SyncError::PathIdentity {
            path: path.to_string(),
            kind: "code",
            reason: "empty path below the code root".to_string(),
        })?;
        let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(*file);
        if stem.is_empty() || packages.iter().any(|s| s.is_empty()) {
            return Err(SyncError::PathIdentity {
                path: path.to_string(),
                kind: "code",
                reason: "empty path segment".to_string(),
            });
        }
        let mut parts: Vec<&str> = packages.to_vec();
        parts.push(stem);
        Ok(Self::new(parts.join(".")))
    }

    /// Canonical path for this class, always with the `.java` extension
    pub fn to_path(&self) -> String {
        format!("{}/{}.java", CODE_ROOT, self.qualified.replace('.', "/"))
    }
}

pub struct CodeAdapter;

impl CodeAdapter {
    /// Component types tagged with the `code` class by metadata discovery
    fn code_types(&self, gateway: &dyn Gateway) -> SyncResult<Vec<String>> {
        let endpoint = gateway.api_path("metadata/components");
        let response = gateway.request(&ApiRequest::get(&endpoint))?;
        response.ensure_ok(&endpoint)?;

        let types = response
            .data()
            .and_then(Value::as_array)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.get("class").and_then(Value::as_str) == Some("code"))
                    .filter_map(|r| r.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(types)
    }

    fn fetch_source(&self, gateway: &dyn Gateway, qualified: &str) -> SyncResult<String> {
        let endpoint = gateway.api_path(&format!("code/{}", qualified));
        let response = gateway.request(&ApiRequest::get(&endpoint))?;
        response.ensure_ok(&endpoint)?;
        let source = response
            .data()
            .and_then(|d| d.get("source_code"))
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::RemoteLogical {
                endpoint,
                detail: "code response carried no source_code field".to_string(),
            })?;
        Ok(source.to_string())
    }
}

impl ComponentAdapter for CodeAdapter {
    fn name(&self) -> &'static str {
        "code"
    }

    fn root(&self) -> &'static str {
        CODE_ROOT
    }

    fn enumerate_remote(&self, gateway: &dyn Gateway) -> SyncResult<Vec<RemoteFile>> {
        let mut files = Vec::new();
        for component_type in self.code_types(gateway)? {
            let records = query_records(
                gateway,
                &format!(
                    "SELECT component_name__sys FROM vault_component__v \
                     WHERE component_type__sys = '{}'",
                    component_type
                ),
            )?;
            for record in &records {
                let Some(qualified) = record_field(record, "component_name") else {
                    tracing::warn!(component_type, "skipping code record without a name");
                    continue;
                };
                let source = self.fetch_source(gateway, qualified)?;
                files.push(RemoteFile::new(
                    ClassRef::new(qualified).to_path(),
                    source.into_bytes(),
                ));
            }
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
        if !plan.deleted.is_empty() {
            tracing::warn!(
                count = plan.deleted.len(),
                "code component deletion is not supported by the remote API, skipping"
            );
            report.skipped += plan.deleted.len();
        }
        if plan.changed.is_empty() {
            return report;
        }
        tracing::info!(count = plan.changed.len(), "processing code file updates");

        for path in &plan.changed {
            let class = match ClassRef::from_path(path) {
                Ok(class) => class,
                Err(e) => {
                    tracing::error!(path, error = %e, "cannot derive class name");
                    report.failed += 1;
                    continue;
                }
            };
            let content = match fs::read_to_string(workdir.join(path)) {
                Ok(content) => content,
                Err(e) => {
                    tracing::error!(path, error = %e, "failed to read code file");
                    report.failed += 1;
                    continue;
                }
            };

            tracing::info!(class = %class.qualified, "pushing code component");
            if dry_run {
                tracing::info!("[dry run] would push {} to {}", path, class.qualified);
                report.applied += 1;
                continue;
            }

            let endpoint = gateway.api_path(&format!("code/{}", class.qualified));
            let request = ApiRequest::put(
                &endpoint,
                Body::Raw {
                    content_type: "text/plain;charset=UTF-8",
                    bytes: content.into_bytes(),
                },
            );
            match gateway
                .request(&request)
                .and_then(|response| response.ensure_ok(&endpoint))
            {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    tracing::error!(class = %class.qualified, error = %e, "code push failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
