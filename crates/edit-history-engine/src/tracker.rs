//! The mutation tracker: the wrapper every file-modifying operation goes
//! through.
//!
//! `Tracker::track` brackets one mutation with identifier assignment,
//! pre/post hashing, checkpointing, diffing, locking and log append — a
//! single, test-visible contract rather than a decorator threaded onto each
//! tool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info};

use crate::allowlist::WorkspaceAllowlist;
use crate::config::EngineConfig;
use crate::diff::unified_diff;
use crate::edits::AnchoredEdit;
use crate::error::{EngineError, Result};
use crate::hash::ContentHash;
use crate::ids::{ConversationId, EditId};
use crate::lock;
use crate::model::{EditEntry, OperationDetail, Status};
use crate::store::HistoryStore;

/// What the caller wants done. The tracker classifies this into the
/// `operation` tag recorded in the log.
pub enum MutationKind {
    /// Whole-file write: `create` if `target` doesn't exist yet, else
    /// `replace`.
    Write { content: Vec<u8> },
    /// Line-specified edit, selectors resolved against the file's original
    /// numbering.
    LineEdit { edits: Vec<(crate::edits::LineSelector, String)> },
    /// Content-anchored edit.
    AnchoredEdit { edit: AnchoredEdit, dry_run: bool },
    /// Rename `source` (passed via [`MutationRequest::source_path`]) to
    /// `target`.
    Move,
    /// Delete `target`.
    Delete,
}

pub struct MutationRequest {
    /// `file_path` in the log: the destination for `move`, the sole path
    /// otherwise.
    pub target: PathBuf,
    /// `source_path`, populated only for `move`.
    pub source_path: Option<PathBuf>,
    pub kind: MutationKind,
    pub tool_name: String,
    pub conversation_id: Option<ConversationId>,
}

#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub conversation_id: ConversationId,
    /// `true` if this call minted a new conversation id.
    pub conversation_started: bool,
    /// `None` for a `dry_run` anchored edit, which writes no log entry.
    pub edit_id: Option<EditId>,
    pub operation: &'static str,
    pub hash_before: Option<ContentHash>,
    pub hash_after: Option<ContentHash>,
    /// The unified diff for content-changing ops, even in `dry_run`.
    pub diff: Option<Vec<u8>>,
}

pub struct Tracker {
    config: EngineConfig,
    store: HistoryStore,
    allowlist: Box<dyn WorkspaceAllowlist>,
}

impl Tracker {
    pub fn new(config: EngineConfig, allowlist: Box<dyn WorkspaceAllowlist>) -> Self {
        let store = HistoryStore::new(&config);
        Self { config, store, allowlist }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Executes one mutation end to end: validate, resolve the conversation,
    /// acquire locks in global order, append a pending log entry, and run
    /// the actual filesystem operation. See module docs for the bracketing
    /// contract this follows step for step.
    pub fn track(&self, req: MutationRequest) -> Result<MutationOutcome> {
        // Step 1: validate against the workspace allowlist.
        let target = self.allowlist.validate(&req.target)?;
        let source = req.source_path.as_ref().map(|p| self.allowlist.validate(p)).transpose()?;

        // Step 2: resolve conversation.
        let (conversation_id, conversation_started) = match req.conversation_id {
            Some(id) => (id, false),
            None => (ConversationId::generate(), true),
        };

        // Step 3-4: log lock first (covers index assignment through
        // append), then file locks in global order. Drop order is the
        // reverse of declaration, so file locks release before the log
        // lock — the reverse of acquisition order.
        let log_path = self.store.log_path(&conversation_id);
        let _log_lock = lock::acquire(&log_path, self.config.lock_timeout(), self.config.stale_lock_age())?;

        let mut lock_targets: Vec<&Path> = vec![&target];
        if let Some(s) = &source {
            lock_targets.push(s);
        }
        let _file_locks = lock::acquire_ordered(&lock_targets, self.config.lock_timeout(), self.config.stale_lock_age())?;

        let prior_entries = self.store.read_log(&conversation_id)?;
        let tool_call_index = prior_entries.len() as u64;

        let logical_origin = source.as_ref().unwrap_or(&target);
        let first_touch = !prior_entries.iter().any(|e| e.touches(logical_origin));

        let dry_run = matches!(&req.kind, MutationKind::AnchoredEdit { dry_run: true, .. });
        let edit_id = EditId::generate();

        let result = self.execute(
            &conversation_id,
            &edit_id,
            &target,
            source.as_deref(),
            logical_origin,
            first_touch,
            dry_run,
            req.kind,
        );

        let (operation, hash_before, hash_after, detail, diff_bytes) = match result {
            Ok(v) => v,
            Err(e) => {
                debug!(conversation = %conversation_id, error = %e, "mutation aborted before log append");
                return Err(e);
            }
        };

        if dry_run {
            return Ok(MutationOutcome {
                conversation_id,
                conversation_started,
                edit_id: None,
                operation,
                hash_before,
                hash_after,
                diff: diff_bytes,
            });
        }

        let entry = EditEntry {
            edit_id: edit_id.clone(),
            conversation_id: conversation_id.clone(),
            tool_call_index,
            timestamp: OffsetDateTime::now_utc(),
            tool_name: req.tool_name,
            status: Status::Pending,
            file_path: target.clone(),
            hash_before: hash_before.clone(),
            hash_after: hash_after.clone(),
            detail,
        };
        self.store.append_log_entry(&conversation_id, &entry)?;
        info!(
            conversation = %conversation_id,
            edit = %edit_id,
            operation,
            path = %target.display(),
            "mutation recorded"
        );

        Ok(MutationOutcome {
            conversation_id,
            conversation_started,
            edit_id: Some(edit_id),
            operation,
            hash_before,
            hash_after,
            diff: diff_bytes,
        })
    }

    /// Steps 5-7 of the algorithm: pre-capture, execute, post-capture.
    /// Returns the pieces `track` needs to build the log entry, plus the
    /// raw diff bytes (so a `dry_run` caller can see them without a log
    /// entry being written).
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        conversation_id: &ConversationId,
        edit_id: &EditId,
        target: &Path,
        source: Option<&Path>,
        logical_origin: &Path,
        _first_touch: bool,
        dry_run: bool,
        kind: MutationKind,
    ) -> Result<(&'static str, Option<ContentHash>, Option<ContentHash>, OperationDetail, Option<Vec<u8>>)> {
        match kind {
            MutationKind::Write { content } => {
                let existed = target.exists();
                let old_bytes = if existed { std::fs::read(target)? } else { Vec::new() };
                let hash_before = existed.then(|| ContentHash::of_bytes(&old_bytes));

                let checkpoint_file = self.maybe_checkpoint(conversation_id, logical_origin, existed, &old_bytes)?;

                std::fs::write(target, &content)?;

                let hash_after = Some(ContentHash::of_bytes(&content));
                let diff_bytes = unified_diff(&old_bytes, &content, &file_label(target));
                let diff_file = self.maybe_write_diff(conversation_id, edit_id, &diff_bytes)?;

                let op = if existed { "replace" } else { "create" };
                let detail = if existed {
                    OperationDetail::Replace { diff_file, checkpoint_file }
                } else {
                    OperationDetail::Create { diff_file, checkpoint_file }
                };
                Ok((op, hash_before, hash_after, detail, Some(diff_bytes)))
            }

            MutationKind::LineEdit { edits } => {
                if !target.exists() {
                    return Err(EngineError::FileMissing { path: target.to_path_buf() });
                }
                let old_bytes = std::fs::read(target)?;
                let hash_before = Some(ContentHash::of_bytes(&old_bytes));
                let old_text = String::from_utf8_lossy(&old_bytes).into_owned();

                let checkpoint_file = self.maybe_checkpoint(conversation_id, logical_origin, true, &old_bytes)?;

                let new_text = crate::edits::apply_line_edits(&old_text, &edits, target)?;
                std::fs::write(target, new_text.as_bytes())?;

                let hash_after = Some(ContentHash::of_bytes(new_text.as_bytes()));
                let diff_bytes = unified_diff(&old_bytes, new_text.as_bytes(), &file_label(target));
                let diff_file = self.maybe_write_diff(conversation_id, edit_id, &diff_bytes)?;

                Ok(("edit", hash_before, hash_after, OperationDetail::Edit { diff_file, checkpoint_file }, Some(diff_bytes)))
            }

            MutationKind::AnchoredEdit { edit, dry_run: _ } => {
                if !target.exists() {
                    return Err(EngineError::FileMissing { path: target.to_path_buf() });
                }
                let old_bytes = std::fs::read(target)?;
                let hash_before = Some(ContentHash::of_bytes(&old_bytes));
                let old_text = String::from_utf8_lossy(&old_bytes).into_owned();

                let checkpoint_file = if dry_run {
                    None
                } else {
                    self.maybe_checkpoint(conversation_id, logical_origin, true, &old_bytes)?
                };

                let new_text = edit.apply(&old_text, target)?;
                let diff_bytes = unified_diff(&old_bytes, new_text.as_bytes(), &file_label(target));

                if dry_run {
                    return Ok(("edit", hash_before, None, OperationDetail::Edit { diff_file: None, checkpoint_file: None }, Some(diff_bytes)));
                }

                std::fs::write(target, new_text.as_bytes())?;
                let hash_after = Some(ContentHash::of_bytes(new_text.as_bytes()));
                let diff_file = self.maybe_write_diff(conversation_id, edit_id, &diff_bytes)?;

                Ok(("edit", hash_before, hash_after, OperationDetail::Edit { diff_file, checkpoint_file }, Some(diff_bytes)))
            }

            MutationKind::Move => {
                let source = source.ok_or_else(|| EngineError::InvalidArgument {
                    message: "move requires a source path".to_string(),
                })?;
                if !source.exists() {
                    return Err(EngineError::FileMissing { path: source.to_path_buf() });
                }
                if target.exists() {
                    return Err(EngineError::DestinationExists { path: target.to_path_buf() });
                }
                let old_bytes = std::fs::read(source)?;
                let hash_before = Some(ContentHash::of_bytes(&old_bytes));

                let checkpoint_file = self.maybe_checkpoint(conversation_id, logical_origin, true, &old_bytes)?;

                std::fs::rename(source, target)?;

                let hash_after = hash_before.clone();
                Ok((
                    "move",
                    hash_before,
                    hash_after,
                    OperationDetail::Move { source_path: source.to_path_buf(), checkpoint_file },
                    None,
                ))
            }

            MutationKind::Delete => {
                if !target.exists() {
                    return Err(EngineError::FileMissing { path: target.to_path_buf() });
                }
                let old_bytes = std::fs::read(target)?;
                let hash_before = Some(ContentHash::of_bytes(&old_bytes));

                let checkpoint_file = self.maybe_checkpoint(conversation_id, logical_origin, true, &old_bytes)?;

                std::fs::remove_file(target)?;

                Ok(("delete", hash_before, None, OperationDetail::Delete { checkpoint_file }, None))
            }
        }
    }

    fn maybe_checkpoint(
        &self,
        conversation_id: &ConversationId,
        origin: &Path,
        existed: bool,
        bytes: &[u8],
    ) -> Result<Option<PathBuf>> {
        if !existed {
            return Ok(None);
        }
        let abs = self.store.write_checkpoint_if_absent(conversation_id, origin, bytes)?;
        Ok(Some(self.store.relative_to_root(&abs)))
    }

    fn maybe_write_diff(&self, conversation_id: &ConversationId, edit_id: &EditId, diff_bytes: &[u8]) -> Result<Option<PathBuf>> {
        if diff_bytes.is_empty() {
            return Ok(None);
        }
        let abs = self.store.write_diff(conversation_id, edit_id.as_str(), diff_bytes)?;
        Ok(Some(self.store.relative_to_root(&abs)))
    }
}

fn file_label(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.display().to_string())
}

/// Releases stale locks under the history store's roots and the workspace
/// itself. Exposed here (rather than only on the reviewer) since any
/// long-lived process embedding the tracker may want the same GC.
pub fn cleanup_stale_locks(workspace_root: &Path, history_root: &Path) -> Result<usize> {
    lock::cleanup_stale_locks(&[workspace_root.to_path_buf(), history_root.to_path_buf()])
}

/// Convenience used by the reviewer when it needs to lock a path without
/// going through a full `track()` call (e.g. during replay).
pub fn lock_path(path: &Path, timeout: Duration, stale_age: Duration) -> Result<lock::LockGuard> {
    lock::acquire(path, timeout, stale_age)
}
