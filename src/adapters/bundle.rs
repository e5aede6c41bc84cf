//! UI bundle adapter
//!
//! Maps `custom_pages/<distribution>/...` trees to the remote's bundle
//! distributions, which travel as zip archives. Change granularity on the
//! remote side is the whole distribution: even a single changed file rebuilds
//! the entire directory into one in-memory archive and uploads it as a unit.
//! A distribution whose directory vanished locally is deleted remotely by
//! name; a partially-emptied one is rebuilt, never deleted.

use std::collections::BTreeSet;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::adapters::{
    record_field, strip_root, AdapterPlan, ApplyReport, ComponentAdapter, RemoteFile, BUNDLE_ROOT,
};
use crate::error::{SyncError, SyncResult};
use crate::gateway::{ApiRequest, Body, FilePart, Gateway};

/// Split a canonical bundle path into (distribution, inner path)
pub fn distribution_of(path: &str) -> SyncResult<(String, String)> {
    let segments = strip_root(path, BUNDLE_ROOT, "bundle")?;
    let [distribution, inner @ ..] = segments.as_slice() else {
        return Err(SyncError::PathIdentity {
            path: path.to_string(),
            kind: "bundle",
            reason: "empty path below the root".to_string(),
        });
    };
    if inner.is_empty() || distribution.is_empty() {
        return Err(SyncError::PathIdentity {
            path: path.to_string(),
            kind: "bundle",
            reason: "expected <distribution>/<file...> below the root".to_string(),
        });
    }
    Ok((distribution.to_string(), inner.join("/")))
}

/// Recursively list files under `dir`, as sorted paths relative to it.
///
/// Sorted order keeps rebuilt archives byte-stable for unchanged content.
fn collect_files(dir: &Path) -> SyncResult<Vec<PathBuf>> {
    fn walk(dir: &Path, base: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path, base, out)?;
            } else if let Ok(rel) = path.strip_prefix(base) {
                out.push(rel.to_path_buf());
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(dir, dir, &mut files)?;
    files.sort();
    Ok(files)
}

/// Zip an entire distribution directory into memory
pub fn build_distribution_archive(dist_dir: &Path) -> SyncResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for rel in collect_files(dist_dir)? {
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        writer.start_file(name, options)?;
        writer.write_all(&fs::read(dist_dir.join(&rel))?)?;
    }
    Ok(writer.finish()?.into_inner())
}

fn unpack_distribution(name: &str, archive_bytes: &[u8]) -> SyncResult<Vec<RemoteFile>> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    let mut files = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut content)?;
        files.push(RemoteFile::new(
            format!("{}/{}/{}", BUNDLE_ROOT, name, entry.name()),
            content,
        ));
    }
    Ok(files)
}

pub struct BundleAdapter;

impl BundleAdapter {
    fn push_distribution(
        &self,
        gateway: &dyn Gateway,
        workdir: &Path,
        distribution: &str,
        dry_run: bool,
    ) -> SyncResult<()> {
        tracing::info!(distribution, "re-packaging and pushing distribution");
        let archive = build_distribution_archive(&workdir.join(BUNDLE_ROOT).join(distribution))?;

        if dry_run {
            tracing::info!(
                "[dry run] would upload {} ({} bytes)",
                distribution,
                archive.len()
            );
            return Ok(());
        }

        let endpoint = gateway.api_path("uicode/distributions");
        let request = ApiRequest::post(
            &endpoint,
            Body::Multipart {
                fields: Vec::new(),
                file: FilePart {
                    file_name: format!("{}.zip", distribution),
                    mime: "application/zip",
                    bytes: archive,
                },
            },
        );
        gateway.request(&request)?.ensure_ok(&endpoint)
    }

    fn delete_distribution(
        &self,
        gateway: &dyn Gateway,
        distribution: &str,
        dry_run: bool,
    ) -> SyncResult<()> {
        tracing::info!(distribution, "deleting distribution");
        if dry_run {
            tracing::info!("[dry run] would delete distribution {}", distribution);
            return Ok(());
        }
        let endpoint = gateway.api_path(&format!("uicode/distributions/{}", distribution));
        gateway.request(&ApiRequest::delete(&endpoint))?.ensure_ok(&endpoint)
    }
}

impl ComponentAdapter for BundleAdapter {
    fn name(&self) -> &'static str {
        "bundle"
    }

    fn root(&self) -> &'static str {
        BUNDLE_ROOT
    }

    fn enumerate_remote(&self, gateway: &dyn Gateway) -> SyncResult<Vec<RemoteFile>> {
        let endpoint = gateway.api_path("uicode/distributions");
        let response = gateway.request(&ApiRequest::get(&endpoint))?;
        response.ensure_ok(&endpoint)?;

        let names: Vec<String> = response
            .data()
            .and_then(Value::as_array)
            .map(|records| {
                records
                    .iter()
                    .filter_map(|r| {
                        r.get("name")
                            .and_then(Value::as_str)
                            .or_else(|| record_field(r, "name"))
                    })
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut files = Vec::new();
        for name in &names {
            let download = gateway.api_path(&format!("uicode/distributions/{}/code", name));
            let response = gateway.request(&ApiRequest::get(&download))?;
            response.ensure_ok(&download)?;
            files.extend(unpack_distribution(name, &response.bytes)?);
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

        // Group file-level changes into distribution-level actions. A deleted
        // file whose distribution directory still exists means the
        // distribution changed; only a vanished directory means remote delete.
        let mut changed: BTreeSet<String> = BTreeSet::new();
        let mut deleted: BTreeSet<String> = BTreeSet::new();

        for path in &plan.changed {
            match distribution_of(path) {
                Ok((dist, _)) => {
                    changed.insert(dist);
                }
                Err(e) => {
                    tracing::error!(path, error = %e, "cannot derive distribution");
                    report.failed += 1;
                }
            }
        }
        for path in &plan.deleted {
            match distribution_of(path) {
                Ok((dist, _)) => {
                    if workdir.join(BUNDLE_ROOT).join(&dist).is_dir() {
                        changed.insert(dist);
                    } else {
                        deleted.insert(dist);
                    }
                }
                Err(e) => {
                    tracing::error!(path, error = %e, "cannot derive distribution");
                    report.failed += 1;
                }
            }
        }
        // Never both rebuild and delete the same distribution in one pass
        for dist in &changed {
            deleted.remove(dist);
        }

        if !changed.is_empty() {
            tracing::info!(count = changed.len(), "processing distribution updates");
        }
        for dist in &changed {
            match self.push_distribution(gateway, workdir, dist, dry_run) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    tracing::error!(distribution = %dist, error = %e, "distribution push failed");
                    report.failed += 1;
                }
            }
        }

        if !deleted.is_empty() {
            tracing::info!(count = deleted.len(), "processing distribution deletions");
        }
        for dist in &deleted {
            match self.delete_distribution(gateway, dist, dry_run) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    tracing::error!(distribution = %dist, error = %e, "distribution delete failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
