//! vaultsync - checksum-driven bidirectional sync between a local source tree
//! and a remote configuration-management API.
//!
//! A working directory holds four tracked roots (MDL components, SDK code, UI
//! bundles, translation catalogs) plus a persisted path-to-checksum state.
//! `pull` materializes the remote configuration locally and sweeps orphans;
//! `push` applies local changes back through per-kind adapters; `package`
//! assembles changed components into a deployment archive and validates it;
//! `patch` renders local changes as a unified diff against the remote.

pub mod adapters;
pub mod checksum;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ignore;
pub mod job;
pub mod package;
pub mod patch;
pub mod session;
pub mod state;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use adapters::{all_adapters, AdapterPlan, ApplyReport, ComponentAdapter, RemoteFile};
pub use checksum::Checksum;
pub use config::VaultConfig;
pub use error::{SyncError, SyncResult};
pub use gateway::{ApiRequest, ApiResponse, Gateway, HttpGateway, ReqwestTransport, Transport};
pub use ignore::IgnoreRules;
pub use job::{JobPoller, JobStatus};
pub use package::{PackageBuilder, PackageOutcome, ValidationOutcome};
pub use patch::PatchGenerator;
pub use session::{FileSession, SessionProvider, StaticSession};
pub use state::ChecksumState;
pub use sync::{PullOrchestrator, PullReport, PushOrchestrator};
