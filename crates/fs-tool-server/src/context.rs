//! Tool context and error type, grounded on
//! `crates/agent/src/tools/context.rs`'s `ToolContext`/`ToolError` pair.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use edit_history_engine::{ConversationId, EngineError, Tracker};

/// Unified error type for filesystem tools. Wraps [`EngineError`] rather than
/// re-deriving the same taxonomy, since every failure a mutation tool can
/// produce already has a home there.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Context a mutation tool is called with: the working directory used to
/// resolve relative paths, a read-only gate, and the shared tracker.
pub trait ToolContext: Send + Sync {
    fn cwd(&self) -> Option<&Path>;

    fn is_read_only(&self) -> bool {
        false
    }

    /// The conversation a mutation belongs to, if the caller is continuing
    /// one already in progress; `None` lets the tracker mint a fresh one.
    fn conversation_id(&self) -> Option<ConversationId> {
        None
    }

    fn tracker(&self) -> &Tracker;

    fn resolve_path(&self, path: &str) -> Result<PathBuf, ToolError> {
        let p = Path::new(path);
        if p.is_absolute() {
            Ok(p.to_path_buf())
        } else {
            self.cwd()
                .map(|cwd| cwd.join(p))
                .ok_or_else(|| ToolError::InvalidRequest("cannot resolve relative path: no working directory set".into()))
        }
    }
}

/// The concrete context this crate ships: one workspace root, one tracker,
/// an optional pinned conversation, shared across tool calls.
pub struct FsToolContext {
    cwd: PathBuf,
    tracker: Arc<Tracker>,
    conversation_id: Option<ConversationId>,
    read_only: bool,
}

impl FsToolContext {
    pub fn new(cwd: PathBuf, tracker: Arc<Tracker>) -> Self {
        Self { cwd, tracker, conversation_id: None, read_only: false }
    }

    /// Pins every mutation made through this context to one conversation,
    /// the way a single chat turn's edits should be grouped together.
    pub fn with_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

impl ToolContext for FsToolContext {
    fn cwd(&self) -> Option<&Path> {
        Some(&self.cwd)
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id.clone()
    }

    fn tracker(&self) -> &Tracker {
        &self.tracker
    }
}
