//! Translation adapter
//!
//! Maps `translations/<language>/<message_type>.csv` files to the remote's
//! message catalogs. Enumeration is indirect: an export job is started and
//! polled, and its artifacts link lists per-catalog download URLs. Push
//! imports one CSV at a time, parameterized by language and message type.
//! The remote offers no catalog deletion.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::adapters::{
    strip_root, AdapterPlan, ApplyReport, ComponentAdapter, RemoteFile, TRANSLATION_ROOT,
};
use crate::error::{SyncError, SyncResult};
use crate::gateway::{ApiRequest, Body, FilePart, Gateway};
use crate::job::JobPoller;

/// (language, message type) pair identifying one catalog
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CatalogRef {
    pub language: String,
    pub message_type: String,
}

impl CatalogRef {
    pub fn new(language: impl Into<String>, message_type: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            message_type: message_type.into(),
        }
    }

    /// Parse identity from `translations/<language>/<message_type>.csv`
    pub fn from_path(path: &str) -> SyncResult<Self> {
        let segments = strip_root(path, TRANSLATION_ROOT, "translation")?;
        let [language, file] = segments.as_slice() else {
            return Err(SyncError::PathIdentity {
                path: path.to_string(),
                kind: "translation",
                reason: "expected exactly <language>/<message_type>.csv below the root".to_string(),
            });
        };
        let message_type = file
            .strip_suffix(".csv")
            .ok_or_else(|| SyncError::PathIdentity {
                path: path.to_string(),
                kind: "translation",
                reason: "missing .csv extension".to_string(),
            })?;
        if language.is_empty() || message_type.is_empty() {
            return Err(SyncError::PathIdentity {
                path: path.to_string(),
                kind: "translation",
                reason: "empty language or message type segment".to_string(),
            });
        }
        Ok(Self::new(*language, message_type))
    }

    /// Inverse of [`CatalogRef::from_path`]
    pub fn to_path(&self) -> String {
        format!(
            "{}/{}/{}.csv",
            TRANSLATION_ROOT, self.language, self.message_type
        )
    }
}

pub struct TranslationAdapter;

impl ComponentAdapter for TranslationAdapter {
    fn name(&self) -> &'static str {
        "translation"
    }

    fn root(&self) -> &'static str {
        TRANSLATION_ROOT
    }

    fn enumerate_remote(&self, gateway: &dyn Gateway) -> SyncResult<Vec<RemoteFile>> {
        let endpoint = gateway.api_path("messages/actions/export");
        let response = gateway.request(&ApiRequest::post(&endpoint, Body::Empty))?;
        response.ensure_ok(&endpoint)?;
        let job_id = response.job_id().ok_or_else(|| SyncError::RemoteLogical {
            endpoint: endpoint.clone(),
            detail: "export response carried no job_id".to_string(),
        })?;

        let details = JobPoller::new(gateway).wait(&job_id)?;
        let artifacts = details
            .link("artifacts")
            .ok_or_else(|| SyncError::RemoteLogical {
                endpoint: endpoint.clone(),
                detail: format!("export job {} finished without an artifacts link", job_id),
            })?;

        let response = gateway.request(&ApiRequest::get(&artifacts.href))?;
        response.ensure_ok(&artifacts.href)?;
        let records: Vec<Value> = response
            .data()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut files = Vec::with_capacity(records.len());
        for record in &records {
            let (Some(language), Some(message_type), Some(url)) = (
                record.get("language").and_then(Value::as_str),
                record.get("message_type").and_then(Value::as_str),
                record.get("url").and_then(Value::as_str),
            ) else {
                tracing::warn!("skipping export artifact without language, type, or url");
                continue;
            };
            let response = gateway.request(&ApiRequest::get(url))?;
            response.ensure_ok(url)?;
            files.push(RemoteFile::new(
                CatalogRef::new(language, message_type).to_path(),
                response.bytes.clone(),
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
        if !plan.deleted.is_empty() {
            tracing::warn!(
                count = plan.deleted.len(),
                "translation catalog deletion is not supported by the remote API, skipping"
            );
            report.skipped += plan.deleted.len();
        }
        if plan.changed.is_empty() {
            return report;
        }
        tracing::info!(count = plan.changed.len(), "processing translation updates");

        for path in &plan.changed {
            let catalog = match CatalogRef::from_path(path) {
                Ok(catalog) => catalog,
                Err(e) => {
                    tracing::error!(path, error = %e, "cannot derive catalog identity");
                    report.failed += 1;
                    continue;
                }
            };
            let content = match fs::read(workdir.join(path)) {
                Ok(content) => content,
                Err(e) => {
                    tracing::error!(path, error = %e, "failed to read translation file");
                    report.failed += 1;
                    continue;
                }
            };

            tracing::info!(
                language = %catalog.language,
                message_type = %catalog.message_type,
                "importing translation catalog"
            );
            if dry_run {
                tracing::info!("[dry run] would import {}", path);
                report.applied += 1;
                continue;
            }

            let endpoint = gateway.api_path("messages/actions/import");
            let request = ApiRequest::post(
                &endpoint,
                Body::Multipart {
                    fields: vec![
                        ("language".to_string(), catalog.language.clone()),
                        ("message_type".to_string(), catalog.message_type.clone()),
                    ],
                    file: FilePart {
                        file_name: format!("{}.csv", catalog.message_type),
                        mime: "text/csv",
                        bytes: content,
                    },
                },
            );
            match gateway
                .request(&request)
                .and_then(|response| response.ensure_ok(&endpoint))
            {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    tracing::error!(path, error = %e, "translation import failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockGateway;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn catalog_identity_roundtrip() {
        let catalog = CatalogRef::from_path("translations/de/field_labels.csv").unwrap();
        assert_eq!(catalog.language, "de");
        assert_eq!(catalog.message_type, "field_labels");
        assert_eq!(catalog.to_path(), "translations/de/field_labels.csv");
    }

    #[test]
    fn catalog_identity_rejects_malformed() {
        assert!(CatalogRef::from_path("translations/field_labels.csv").is_err());
        assert!(CatalogRef::from_path("translations/de/extra/field_labels.csv").is_err());
        assert!(CatalogRef::from_path("translations/de/field_labels.txt").is_err());
    }

    proptest! {
        #[test]
        fn catalog_bijection_holds(
            language in "[a-z]{2}(_[A-Z]{2})?",
            message_type in "[a-z][a-z0-9_]{0,20}",
        ) {
            let catalog = CatalogRef::new(language, message_type);
            let parsed = CatalogRef::from_path(&catalog.to_path()).unwrap();
            prop_assert_eq!(parsed, catalog);
        }
    }

    #[test]
    fn enumerate_exports_polls_then_downloads() {
        let gateway = MockGateway::new();
        gateway.enqueue(
            "POST /api/v26.1/messages/actions/export",
            200,
            json!({"responseStatus": "SUCCESS", "job_id": "501"}),
        );
        // SUCCESS on the first poll, so no real sleep happens
        gateway.enqueue(
            "GET /api/v26.1/services/jobs/501",
            200,
            json!({
                "responseStatus": "SUCCESS",
                "data": {
                    "id": "501",
                    "status": "SUCCESS",
                    "links": [{"rel": "artifacts", "href": "/api/v26.1/messages/exports/501"}]
                }
            }),
        );
        gateway.enqueue(
            "GET /api/v26.1/messages/exports/501",
            200,
            json!({
                "responseStatus": "SUCCESS",
                "data": [
                    {"language": "de", "message_type": "field_labels", "url": "/files/de.csv"},
                    {"language": "fr", "message_type": "field_labels", "url": "/files/fr.csv"}
                ]
            }),
        );
        gateway.enqueue_bytes("GET /files/de.csv", 200, b"key,value\n".to_vec());
        gateway.enqueue_bytes("GET /files/fr.csv", 200, b"cle,valeur\n".to_vec());

        let files = TranslationAdapter.enumerate_remote(&gateway).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "translations/de/field_labels.csv");
        assert_eq!(files[0].content, b"key,value\n");
        assert_eq!(files[1].path, "translations/fr/field_labels.csv");
    }

    #[test]
    fn enumerate_fails_when_export_job_fails() {
        let gateway = MockGateway::new();
        gateway.enqueue(
            "POST /api/v26.1/messages/actions/export",
            200,
            json!({"responseStatus": "SUCCESS", "job_id": "501"}),
        );
        gateway.enqueue(
            "GET /api/v26.1/services/jobs/501",
            200,
            json!({"responseStatus": "SUCCESS", "data": {"id": "501", "status": "FAILURE"}}),
        );

        let err = TranslationAdapter.enumerate_remote(&gateway).unwrap_err();
        assert!(matches!(err, SyncError::JobFailed { .. }));
    }

    #[test]
    fn apply_imports_with_catalog_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let lang_dir = dir.path().join("translations/de");
        std::fs::create_dir_all(&lang_dir).unwrap();
        std::fs::write(lang_dir.join("field_labels.csv"), "key,value\n").unwrap();

        let gateway = MockGateway::new();
        gateway.enqueue(
            "POST /api/v26.1/messages/actions/import",
            200,
            json!({"responseStatus": "SUCCESS"}),
        );

        let plan = AdapterPlan {
            changed: vec!["translations/de/field_labels.csv".to_string()],
            deleted: vec![],
        };
        let report = TranslationAdapter.apply_changes(&gateway, dir.path(), &plan, false);
        assert_eq!(report.applied, 1);

        let sent = gateway.requests_for("POST /api/v26.1/messages/actions/import");
        let Body::Multipart { fields, file } = &sent[0].body else {
            panic!("expected multipart import");
        };
        assert!(fields.contains(&("language".to_string(), "de".to_string())));
        assert!(fields.contains(&("message_type".to_string(), "field_labels".to_string())));
        assert_eq!(file.file_name, "field_labels.csv");
    }

    #[test]
    fn deletions_are_skipped_not_attempted() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = MockGateway::new();
        let plan = AdapterPlan {
            changed: vec![],
            deleted: vec!["translations/de/field_labels.csv".to_string()],
        };
        let report = TranslationAdapter.apply_changes(&gateway, dir.path(), &plan, false);
        assert_eq!(report.skipped, 1);
        assert_eq!(gateway.request_count(), 0);
    }
}
