//! Mutation tracking, checkpointing and replay for LM-driven file edits.
//!
//! This crate is the Edit History Engine: it wraps every file-modifying
//! operation an LM issues against a governed workspace, records it as an
//! append-only log entry alongside a checkpoint and a unified diff, and lets
//! a reviewer later accept or reject individual edits by replaying the log
//! from the checkpoint forward.

pub mod allowlist;
pub mod config;
pub mod diff;
pub mod edits;
pub mod error;
pub mod hash;
pub mod ids;
pub mod lock;
pub mod model;
pub mod replay;
pub mod reviewer;
pub mod store;
pub mod tracker;

pub use allowlist::{SingleRootAllowlist, WorkspaceAllowlist};
pub use config::EngineConfig;
pub use error::{EngineError, ErrorCategory, Result};
pub use hash::ContentHash;
pub use ids::{ConversationId, EditId};
pub use model::{EditEntry, OperationDetail, Status};
pub use replay::{ExternalChangeResolver, ReplayReport};
pub use reviewer::{IdentifierResolution, Reviewer, StatusFilter};
pub use store::HistoryStore;
pub use tracker::{MutationKind, MutationOutcome, MutationRequest, Tracker};

/// Bundles the pieces an embedder (a tool-server, the reviewer CLI) needs to
/// operate on one workspace: a [`Tracker`] for mutation and a [`Reviewer`]
/// for status/replay, sharing one [`HistoryStore`].
pub struct Engine {
    config: EngineConfig,
    tracker: Tracker,
    reviewer: Reviewer,
}

impl Engine {
    /// `allowlist` governs every path the tracker is asked to touch; the
    /// reviewer does not re-validate paths, since replay only ever writes
    /// to paths the tracker already validated when the edit was recorded.
    pub fn open(config: EngineConfig, allowlist: Box<dyn WorkspaceAllowlist>) -> Self {
        let store = HistoryStore::new(&config);
        let tracker = Tracker::new(config.clone(), allowlist);
        let reviewer = Reviewer::new(config.clone(), store);
        Self { config, tracker, reviewer }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn reviewer(&self) -> &Reviewer {
        &self.reviewer
    }
}
