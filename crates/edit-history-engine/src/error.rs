//! Structured error taxonomy for the history engine.
//!
//! Each family below surfaces as its own variant group rather than a single
//! catch-all string, so callers (the tool-server, the reviewer CLI) can match
//! on the kind of failure instead of parsing messages.

use std::path::PathBuf;

use thiserror::Error;

/// The error categories the reviewer CLI maps to distinct process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Precondition,
    Lock,
    Integrity,
    Patch,
    Io,
}

#[derive(Debug, Error)]
pub enum EngineError {
    // ---- Validation ----
    #[error("path `{path}` lies outside the workspace")]
    PathOutsideWorkspace { path: PathBuf },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("conflicting line selectors for `{}`: {detail}", path.display())]
    ConflictingEdit { path: PathBuf, detail: String },

    // ---- Precondition ----
    #[error("file `{}` does not exist", path.display())]
    FileMissing { path: PathBuf },

    #[error("file `{}` already exists at destination", path.display())]
    DestinationExists { path: PathBuf },

    #[error("anchor `{anchor}` not found in `{}`", path.display())]
    AnchorNotFound { path: PathBuf, anchor: String },

    // ---- Lock ----
    #[error("timed out after {timeout_ms}ms acquiring lock on `{}`", path.display())]
    LockTimeout { path: PathBuf, timeout_ms: u64 },

    #[error(
        "lock on `{}` was held by a dead process and has been reclaimed; run `cleanup` to tidy up remaining stale locks",
        path.display()
    )]
    StaleLockRetained { path: PathBuf },

    // ---- Integrity ----
    #[error(
        "`{}` was modified outside the engine: expected hash {expected}, found {found}",
        path.display()
    )]
    HashMismatchExternal {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error(
        "no checkpoint recorded for `{}` in conversation {conversation_id}",
        path.display()
    )]
    MissingCheckpoint {
        conversation_id: String,
        path: PathBuf,
    },

    #[error(
        "internal hash drift on `{}` during replay: expected {expected}, found {found} (this indicates an engine bug)",
        path.display()
    )]
    InternalHashDrift {
        path: PathBuf,
        expected: String,
        found: String,
    },

    // ---- Patch ----
    #[error("patch for edit {edit_id} did not apply to `{}`: context mismatch", path.display())]
    PatchContextMismatch { path: PathBuf, edit_id: String },

    // ---- Identifier resolution ----
    #[error("no entity matches prefix `{prefix}`")]
    NoSuchIdentifier { prefix: String },

    #[error("prefix `{prefix}` is ambiguous between {count} entities")]
    AmbiguousIdentifier { prefix: String, count: usize },

    // ---- I/O & serialization (wrapped, not stringified) ----
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed log entry: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// The category the reviewer CLI uses to select a process exit code.
    pub fn category(&self) -> ErrorCategory {
        use EngineError::*;
        match self {
            PathOutsideWorkspace { .. }
            | InvalidArgument { .. }
            | ConflictingEdit { .. }
            | NoSuchIdentifier { .. }
            | AmbiguousIdentifier { .. } => ErrorCategory::Validation,

            FileMissing { .. } | DestinationExists { .. } | AnchorNotFound { .. } => {
                ErrorCategory::Precondition
            }

            LockTimeout { .. } | StaleLockRetained { .. } => ErrorCategory::Lock,

            HashMismatchExternal { .. } | MissingCheckpoint { .. } | InternalHashDrift { .. } => {
                ErrorCategory::Integrity
            }

            PatchContextMismatch { .. } => ErrorCategory::Patch,

            Io(_) | Json(_) => ErrorCategory::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
