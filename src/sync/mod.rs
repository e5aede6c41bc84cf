//! Sync orchestration: local snapshotting, pull, and push.

pub mod pull;
pub mod push;
pub mod snapshot;

pub use pull::{PullOrchestrator, PullReport};
pub use push::PushOrchestrator;
pub use snapshot::{canonical_path, detect_changes, local_snapshot, Change, ChangeSet};
