//! The replay algorithm: deterministic reconstruction of a file's state from
//! its checkpoint forward, honouring each edit's current status.
//!
//! The algorithm walks a conversation's entries for one logical file in
//! `tool_call_index` order, applying accepted/pending edits and skipping
//! rejected ones, and writes the result once at the end.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::diff::apply_patch;
use crate::error::{EngineError, Result};
use crate::hash::ContentHash;
use crate::ids::ConversationId;
use crate::lock;
use crate::model::{EditEntry, OperationDetail};
use crate::store::HistoryStore;

/// Asked to resolve a hash-integrity preflight failure: the file on disk no
/// longer matches the last state the engine recorded for it (`None` stands
/// for "absent" on either side). Returns `true` to proceed (discarding the
/// external change), `false` to abort.
pub trait ExternalChangeResolver: Send + Sync {
    fn resolve(&self, path: &Path, recorded: Option<&ContentHash>, current: Option<&ContentHash>) -> bool;
}

/// Always aborts on an external change. Used where no interactive reviewer
/// is present (tests, non-interactive callers that want the safe default).
pub struct AlwaysAbort;
impl ExternalChangeResolver for AlwaysAbort {
    fn resolve(&self, _path: &Path, _recorded: Option<&ContentHash>, _current: Option<&ContentHash>) -> bool {
        false
    }
}

/// Always discards the external change and proceeds. Used by callers that
/// have already obtained consent out of band.
pub struct AlwaysProceed;
impl ExternalChangeResolver for AlwaysProceed {
    fn resolve(&self, _path: &Path, _recorded: Option<&ContentHash>, _current: Option<&ContentHash>) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// The file's name after replay (differs from the input `file_path` if
    /// the last relevant `move` in the chain ended up skipped).
    pub final_path: PathBuf,
    /// `true` if the file exists on disk after replay.
    pub exists: bool,
    /// Set when the final on-disk hash could not be reconciled with the
    /// replay's own bookkeeping — a warning, not a failure: the engine must
    /// not lie about success, but this does not undo anything.
    pub final_hash_warning: Option<String>,
}

/// Replays `conversation_id`'s entries affecting the logical file currently
/// named `file_path`, writing the resulting state to disk.
///
/// `file_path` should be the name the file is known by right now (e.g. as
/// shown by `status`); the identity trace below finds every other name it
/// held earlier in this conversation via `move` entries.
pub fn replay(
    store: &HistoryStore,
    conversation_id: &ConversationId,
    file_path: &Path,
    resolver: &dyn ExternalChangeResolver,
    lock_timeout: Duration,
    stale_age: Duration,
) -> Result<ReplayReport> {
    let mut entries = store.read_log(conversation_id)?;
    entries.sort_by_key(|e| e.tool_call_index);

    let names = trace_identity(&entries, file_path);
    let mut relevant: Vec<&EditEntry> = entries.iter().filter(|e| touches_any(e, &names)).collect();
    relevant.sort_by_key(|e| e.tool_call_index);

    if relevant.is_empty() {
        return Ok(ReplayReport { final_path: file_path.to_path_buf(), exists: file_path.exists(), final_hash_warning: None });
    }

    let mut lock_paths: Vec<&Path> = names.iter().map(PathBuf::as_path).collect();
    lock_paths.sort();
    let _locks = lock::acquire_ordered(&lock_paths, lock_timeout, stale_age)?;

    // Hash-integrity preflight: the most recent entry *anywhere in the
    // store* that recorded a hash_after for this file, compared against
    // what's actually on disk right now.
    preflight_hash_check(store, file_path, resolver)?;

    let first = relevant[0];
    let is_first_create = matches!(first.detail, OperationDetail::Create { .. });

    let mut buffer: Option<Vec<u8>> = if is_first_create {
        None
    } else {
        let origin = first.detail.source_path().unwrap_or(&first.file_path);
        let checkpoint_file = first.detail.checkpoint_file().ok_or_else(|| EngineError::MissingCheckpoint {
            conversation_id: conversation_id.to_string(),
            path: origin.clone(),
        })?;
        Some(store.read_checkpoint(&store.absolute(checkpoint_file))?)
    };

    let mut current_path = first.detail.source_path().cloned().unwrap_or_else(|| first.file_path.clone());

    for entry in &relevant {
        let applied = entry.status.is_effectively_applied();

        match &entry.detail {
            OperationDetail::Create { diff_file, .. }
            | OperationDetail::Replace { diff_file, .. }
            | OperationDetail::Edit { diff_file, .. } => {
                if applied {
                    let needs_base = !matches!(entry.detail, OperationDetail::Create { .. });
                    if needs_base && buffer.is_none() {
                        return Err(EngineError::MissingCheckpoint {
                            conversation_id: conversation_id.to_string(),
                            path: entry.file_path.clone(),
                        });
                    }
                    let old = buffer.clone().unwrap_or_default();
                    let new_bytes = match diff_file {
                        Some(df) => {
                            let diff_bytes = store.read_diff(&store.absolute(df))?;
                            apply_patch(&old, &diff_bytes).map_err(|_| EngineError::PatchContextMismatch {
                                path: entry.file_path.clone(),
                                edit_id: entry.edit_id.to_string(),
                            })?
                        }
                        None => old, // byte-identical write recorded no diff
                    };
                    if let Some(expected) = &entry.hash_after {
                        let found = ContentHash::of_bytes(&new_bytes);
                        if &found != expected {
                            return Err(EngineError::InternalHashDrift {
                                path: entry.file_path.clone(),
                                expected: expected.as_str().to_string(),
                                found: found.as_str().to_string(),
                            });
                        }
                    }
                    buffer = Some(new_bytes);
                }
                current_path = entry.file_path.clone();
            }
            OperationDetail::Delete { .. } => {
                if applied {
                    buffer = None;
                }
            }
            OperationDetail::Move { source_path, .. } => {
                if applied {
                    current_path = entry.file_path.clone();
                } else {
                    current_path = source_path.clone();
                }
            }
        }
    }

    // Materialize: write the final buffer at its final name, removing any
    // stale copy left at an intermediate name by a rejected move.
    for name in &names {
        if name != &current_path && name.exists() {
            let _ = std::fs::remove_file(name);
        }
    }
    match &buffer {
        Some(bytes) => {
            if let Some(parent) = current_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&current_path, bytes)?;
        }
        None => {
            if current_path.exists() {
                std::fs::remove_file(&current_path)?;
            }
        }
    }

    let final_hash_warning = final_verification(&current_path, buffer.as_deref());

    info!(
        conversation = %conversation_id,
        path = %current_path.display(),
        entries = relevant.len(),
        "replay complete"
    );

    Ok(ReplayReport { final_path: current_path.clone(), exists: buffer.is_some(), final_hash_warning })
}

/// Walks backward through `entries`' `move` operations starting from
/// `file_path`, collecting every name the logical file held in this
/// conversation.
fn trace_identity(entries: &[EditEntry], file_path: &Path) -> HashSet<PathBuf> {
    let mut names = HashSet::new();
    names.insert(file_path.to_path_buf());
    loop {
        let mut added = false;
        for e in entries {
            if let OperationDetail::Move { source_path, .. } = &e.detail {
                if names.contains(&e.file_path) && !names.contains(source_path) {
                    names.insert(source_path.clone());
                    added = true;
                }
            }
        }
        if !added {
            break;
        }
    }
    names
}

fn touches_any(entry: &EditEntry, names: &HashSet<PathBuf>) -> bool {
    names.contains(&entry.file_path) || entry.detail.source_path().map(|p| names.contains(p)).unwrap_or(false)
}

fn preflight_hash_check(store: &HistoryStore, file_path: &Path, resolver: &dyn ExternalChangeResolver) -> Result<()> {
    let all = store.read_all_entries()?;
    let Some(most_recent) = all.iter().filter(|e| e.file_path == file_path).max_by_key(|e| e.timestamp) else {
        return Ok(());
    };
    let recorded = most_recent.hash_after.clone();
    let current = store.current_hash(file_path)?;

    if recorded == current {
        return Ok(());
    }

    if resolver.resolve(file_path, recorded.as_ref(), current.as_ref()) {
        warn!(path = %file_path.display(), "proceeding with replay after discarding external change");
        return Ok(());
    }

    Err(EngineError::HashMismatchExternal {
        path: file_path.to_path_buf(),
        expected: recorded.as_ref().map(ContentHash::as_str).unwrap_or("<absent>").to_string(),
        found: current.as_ref().map(ContentHash::as_str).unwrap_or("<absent>").to_string(),
    })
}

fn final_verification(path: &Path, expected_bytes: Option<&[u8]>) -> Option<String> {
    let on_disk = std::fs::read(path).ok();
    match (on_disk.as_deref(), expected_bytes) {
        (None, None) => None,
        (Some(a), Some(b)) if a == b => None,
        (None, Some(_)) => Some(format!("expected `{}` to exist after replay but it does not", path.display())),
        (Some(_), None) => Some(format!("expected `{}` to be absent after replay but it exists", path.display())),
        (Some(_), Some(_)) => Some(format!("on-disk content of `{}` does not match replay's materialized buffer", path.display())),
    }
}
