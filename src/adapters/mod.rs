//! Component adapters
//!
//! Each adapter maps one local file layout to one remote resource model. The
//! orchestrators never branch on path prefixes; they iterate the closed set
//! returned by [`all_adapters`] and drive every adapter through the same two
//! capabilities: remote enumeration (pull) and local-change application
//! (push).
//!
//! Adapter order is fixed and documented: MDL, code, UI bundles, translations.

pub mod bundle;
pub mod code;
pub mod mdl;
pub mod translation;

use std::path::Path;

use serde_json::Value;

use crate::checksum::Checksum;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{ApiRequest, Body, Gateway};

pub use bundle::BundleAdapter;
pub use code::CodeAdapter;
pub use mdl::MdlAdapter;
pub use translation::TranslationAdapter;

/// Local root directory per adapter
pub const MDL_ROOT: &str = "components";
pub const CODE_ROOT: &str = "javasdk";
pub const BUNDLE_ROOT: &str = "custom_pages";
pub const TRANSLATION_ROOT: &str = "translations";

/// The four tracked roots, in adapter order
pub const TRACKED_ROOTS: [&str; 4] = [MDL_ROOT, CODE_ROOT, BUNDLE_ROOT, TRANSLATION_ROOT];

/// One remote artifact mapped to its canonical local path
#[derive(Debug, Clone)]
pub struct RemoteFile {
    /// Canonical relative path, forward-slash separated
    pub path: String,
    pub content: Vec<u8>,
    pub checksum: Checksum,
}

impl RemoteFile {
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        let checksum = Checksum::of_bytes(&content);
        Self {
            path: path.into(),
            content,
            checksum,
        }
    }
}

/// Changed and deleted paths belonging to one adapter's root
#[derive(Debug, Clone, Default)]
pub struct AdapterPlan {
    pub changed: Vec<String>,
    pub deleted: Vec<String>,
}

impl AdapterPlan {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// Item-level outcome counts of one adapter's apply step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ApplyReport {
    pub fn absorb(&mut self, other: ApplyReport) {
        self.applied += other.applied;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Capability interface every component adapter implements.
///
/// Item-level failures inside `apply_changes` are logged and counted, never
/// propagated: one bad item must not stop sibling items or sibling adapters.
/// `enumerate_remote` failures, by contrast, surface as `Err` so the pull
/// orchestrator can exclude the adapter from the orphan sweep.
pub trait ComponentAdapter {
    fn name(&self) -> &'static str;

    /// Local root directory this adapter owns
    fn root(&self) -> &'static str;

    /// Enumerate all remote artifacts, following pagination to the end
    fn enumerate_remote(&self, gateway: &dyn Gateway) -> SyncResult<Vec<RemoteFile>>;

    /// Apply local changes and deletions to the remote.
    ///
    /// In dry-run mode no remote call is made; intended actions are logged
    /// and counted as applied.
    fn apply_changes(
        &self,
        gateway: &dyn Gateway,
        workdir: &Path,
        plan: &AdapterPlan,
        dry_run: bool,
    ) -> ApplyReport;
}

/// All adapters in their fixed execution order
pub fn all_adapters() -> Vec<Box<dyn ComponentAdapter>> {
    vec![
        Box::new(MdlAdapter),
        Box::new(CodeAdapter),
        Box::new(BundleAdapter),
        Box::new(TranslationAdapter),
    ]
}

/// Run a paginated query, following `next_page` links verbatim until none
/// remain. Pages are fetched strictly sequentially.
pub(crate) fn query_records(gateway: &dyn Gateway, query: &str) -> SyncResult<Vec<Value>> {
    let endpoint = gateway.api_path("query/components");
    let request = ApiRequest::post(
        &endpoint,
        Body::Form(vec![("q".to_string(), query.to_string())]),
    );
    let mut response = gateway.request(&request)?;
    response.ensure_ok(&endpoint)?;

    let mut records: Vec<Value> = response
        .data()
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    loop {
        let next = response
            .json
            .as_ref()
            .and_then(|v| v.get("responseDetails"))
            .and_then(|d| d.get("next_page"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let Some(next_url) = next else { break };

        response = gateway.request(&ApiRequest::get(&next_url))?;
        response.ensure_ok(&next_url)?;
        if let Some(page) = response.data().and_then(Value::as_array) {
            records.extend(page.iter().cloned());
        }
    }

    Ok(records)
}

/// Read an identity field by its `__sys` name, falling back to the legacy
/// `__v` spelling. The fallback logs a warning: a server speaking the other
/// convention should be noticed, not silently tolerated, because a missed
/// field would otherwise drop records from the sweep.
pub(crate) fn record_field<'a>(record: &'a Value, base: &str) -> Option<&'a str> {
    if let Some(value) = record
        .get(format!("{}__sys", base))
        .and_then(Value::as_str)
    {
        return Some(value);
    }
    if let Some(value) = record.get(format!("{}__v", base)).and_then(Value::as_str) {
        tracing::warn!(
            field = format!("{}__v", base),
            "record uses legacy field naming, expected __sys suffix"
        );
        return Some(value);
    }
    None
}

/// Canonical path split helper shared by the identity bijections: checks the
/// root, then returns the remaining segments.
pub(crate) fn strip_root<'a>(
    path: &'a str,
    root: &'static str,
    kind: &'static str,
) -> SyncResult<Vec<&'a str>> {
    let rest = path
        .strip_prefix(root)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(|| SyncError::PathIdentity {
            path: path.to_string(),
            kind,
            reason: format!("expected the '{}/' prefix", root),
        })?;
    if rest.is_empty() {
        return Err(SyncError::PathIdentity {
            path: path.to_string(),
            kind,
            reason: "empty path below the adapter root".to_string(),
        });
    }
    Ok(rest.split('/').collect())
}
