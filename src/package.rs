//! Deployment package builder
//!
//! Collects changed MDL files into a deployment archive, submits it to the
//! remote import service, resolves the resulting package id, and triggers
//! validation. Import and validation may each come back as an asynchronous
//! job; both use the same bounded polling protocol.
//!
//! The archive layout is deterministic: files enter in sorted path order, one
//! ordinal step folder per file (starting at 10, stepping by 10), each holding
//! the MDL body and an `.md5` sidecar naming the qualified component.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::adapters::mdl::ComponentRef;
use crate::checksum::Checksum;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{ApiRequest, Body, FilePart, Gateway};
use crate::ignore::IgnoreRules;
use crate::job::{Clock, JobPoller};
use crate::state::ChecksumState;
use crate::sync::snapshot::{detect_changes, local_snapshot};

/// Archive file name written to the working directory before submission
pub const PACKAGE_FILE: &str = "vaultsync_deployment.vpk";

const MANIFEST_NAME: &str = "vaultpackage.xml";

const MANIFEST_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<vaultpackage>
    <name>{{name}}</name>
    <source>
        <author>{{author}}</author>
    </source>
    <summary>{{summary}}</summary>
    <packagetype>migration__v</packagetype>
</vaultpackage>
"#;

fn render_manifest(name: &str, author: &str, summary: &str) -> String {
    MANIFEST_TEMPLATE
        .replace("{{name}}", name)
        .replace("{{author}}", author)
        .replace("{{summary}}", summary)
}

/// Validation result, reported distinctly from the import outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Passed,
    Failed(String),
}

/// Terminal outcome of one package run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    /// No changed MDL files; nothing was built or submitted
    NoChanges,
    Built {
        package_id: String,
        validation: ValidationOutcome,
    },
}

pub struct PackageBuilder<'a> {
    gateway: &'a dyn Gateway,
    workdir: &'a Path,
    clock: Option<&'a dyn Clock>,
}

impl<'a> PackageBuilder<'a> {
    pub fn new(gateway: &'a dyn Gateway, workdir: &'a Path) -> Self {
        Self {
            gateway,
            workdir,
            clock: None,
        }
    }

    /// Substitute the sleep used while polling import and validate jobs
    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    fn poller(&self) -> JobPoller<'a> {
        match self.clock {
            Some(clock) => JobPoller::new(self.gateway).with_clock(clock),
            None => JobPoller::new(self.gateway),
        }
    }

    /// Build, submit, and validate a package from the currently changed MDL
    /// files. `author` lands in the manifest.
    pub fn run(
        &self,
        state: &ChecksumState,
        ignore: &IgnoreRules,
        author: &str,
    ) -> SyncResult<PackageOutcome> {
        let snapshot = local_snapshot(self.workdir, ignore)?;
        let changed = detect_changes(&snapshot, state).changed_mdl_paths();
        if changed.is_empty() {
            tracing::info!("no changed MDL components, nothing to package");
            return Ok(PackageOutcome::NoChanges);
        }
        tracing::info!(files = changed.len(), "building deployment package");

        let archive = self.build_archive(&changed, author)?;
        let archive_path = self.workdir.join(PACKAGE_FILE);
        fs::write(&archive_path, &archive)?;
        tracing::info!(path = %archive_path.display(), bytes = archive.len(), "package written");

        let package_id = self.submit(archive)?;
        tracing::info!(package_id = %package_id, "package imported");

        let validation = match self.validate(&package_id) {
            Ok(()) => {
                tracing::info!(package_id = %package_id, "package validation passed");
                ValidationOutcome::Passed
            }
            Err(e) => {
                tracing::error!(package_id = %package_id, error = %e, "package validation failed");
                ValidationOutcome::Failed(e.to_string())
            }
        };

        Ok(PackageOutcome::Built {
            package_id,
            validation,
        })
    }

    /// Assemble the archive in memory: manifest first, then one step folder
    /// per changed file.
    fn build_archive(&self, changed: &[String], author: &str) -> SyncResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let summary = format!("Deployment package with {} changed components", changed.len());
        writer.start_file(MANIFEST_NAME, options)?;
        writer.write_all(render_manifest("vaultsync_deployment", author, &summary).as_bytes())?;

        for (index, path) in changed.iter().enumerate() {
            let component = ComponentRef::from_path(path)?;
            let content = fs::read(self.workdir.join(path))?;
            let hash = Checksum::of_bytes(&content);
            let step = (index as u32 + 1) * 10;

            writer.start_file(
                format!("components/{:06}/{}.mdl", step, component.qualified()),
                options,
            )?;
            writer.write_all(&content)?;

            writer.start_file(
                format!("components/{:06}/{}.md5", step, component.qualified()),
                options,
            )?;
            writer.write_all(format!("{} {}", hash, component.qualified()).as_bytes())?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Submit the archive and resolve the package id, polling through a job
    /// when the import is asynchronous.
    fn submit(&self, archive: Vec<u8>) -> SyncResult<String> {
        let endpoint = self.gateway.api_path("services/package");
        let request = ApiRequest::put(
            &endpoint,
            Body::Multipart {
                fields: Vec::new(),
                file: FilePart {
                    file_name: PACKAGE_FILE.to_string(),
                    mime: "application/zip",
                    bytes: archive,
                },
            },
        );
        let response = self.gateway.request(&request)?;
        response.ensure_ok(&endpoint)?;

        if let Some(job_id) = response.job_id() {
            let details = self.poller().wait(&job_id)?;
            // The artifacts link carries the package id as its last segment
            if let Some(link) = details.link("artifacts") {
                if let Some(id) = link.href.rsplit('/').next().filter(|s| !s.is_empty()) {
                    return Ok(id.to_string());
                }
            }
            if let Some(id) = details.field("package_id__v") {
                return Ok(id.to_string());
            }
            return Err(SyncError::RemoteLogical {
                endpoint,
                detail: format!("import job {} finished without a package id", job_id),
            });
        }

        response
            .data()
            .and_then(|d| d.get("package_id__v"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SyncError::RemoteLogical {
                endpoint,
                detail: "import response carried neither job_id nor package_id__v".to_string(),
            })
    }

    fn validate(&self, package_id: &str) -> SyncResult<()> {
        let endpoint = self
            .gateway
            .api_path(&format!("services/package/{}/actions/validate", package_id));
        let response = self
            .gateway
            .request(&ApiRequest::post(&endpoint, Body::Empty))?;
        response.ensure_ok(&endpoint)?;

        if let Some(job_id) = response.job_id() {
            self.poller().wait(&job_id)?;
        }
        Ok(())
    }
}
