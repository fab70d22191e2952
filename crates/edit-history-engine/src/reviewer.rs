//! The reviewer surface: status listing, identifier resolution, accept /
//! reject with replay, and stale-lock cleanup. The interactive `review` loop
//! itself (reading keystrokes) belongs to the CLI binary, which drives this
//! module's `pending_oldest_first`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::ids::{ConversationId, EditId};
use crate::lock;
use crate::model::{EditEntry, Status};
use crate::replay::{self, ExternalChangeResolver};
use crate::store::HistoryStore;
use crate::tracker;

/// Result of resolving a CLI-supplied prefix against edit and conversation
/// identifiers. Mirrors the "exception-for-control-flow becomes an explicit
/// result variant" design note: ambiguity is a value, not a thrown error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierResolution {
    Edit(EditId),
    Conversation(ConversationId),
    /// More than one entity matches; `edits` and `conversations` list every
    /// candidate so the caller can present a disambiguation prompt.
    Ambiguous { edits: Vec<EditId>, conversations: Vec<ConversationId> },
    None,
}

#[derive(Debug, Clone, Default)]
pub struct StatusFilter {
    pub conversation_id: Option<ConversationId>,
    pub file_path: Option<PathBuf>,
    pub status: Option<Status>,
    /// Keep only entries newer than this.
    pub since: Option<time::OffsetDateTime>,
    /// `None` uses the default limit; `Some(0)` removes the limit.
    pub limit: Option<usize>,
}

pub const DEFAULT_STATUS_LIMIT: usize = 50;

pub struct Reviewer {
    config: EngineConfig,
    store: HistoryStore,
}

impl Reviewer {
    pub fn new(config: EngineConfig, store: HistoryStore) -> Self {
        Self { config, store }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// All entries across every conversation, newest first, after applying
    /// `filter`.
    pub fn status(&self, filter: &StatusFilter) -> Result<Vec<EditEntry>> {
        let mut entries = self.store.read_all_entries()?;

        if let Some(conv) = &filter.conversation_id {
            entries.retain(|e| &e.conversation_id == conv);
        }
        if let Some(path) = &filter.file_path {
            let resolved = self.resolve_filter_path(path);
            entries.retain(|e| e.file_path == resolved || e.detail.source_path() == Some(resolved.as_path()));
        }
        if let Some(status) = filter.status {
            entries.retain(|e| e.status == status);
        }
        if let Some(since) = filter.since {
            entries.retain(|e| e.timestamp >= since);
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let limit = filter.limit.unwrap_or(DEFAULT_STATUS_LIMIT);
        if limit > 0 {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Resolves a `--file`-style filter path to the canonical absolute form
    /// stored entries use, so a relative or symlinked argument still
    /// matches. Tolerates a path that no longer exists on disk (the file
    /// may since have been deleted) by falling back to the lexical join.
    fn resolve_filter_path(&self, path: &Path) -> PathBuf {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.workspace_root.join(path)
        };
        crate::allowlist::canonicalize_best_effort(&absolute).unwrap_or(absolute)
    }

    /// Every pending edit across all conversations (or one, if given),
    /// oldest first — the order the interactive `review` loop walks.
    pub fn pending_oldest_first(&self, conversation_id: Option<&ConversationId>) -> Result<Vec<EditEntry>> {
        let mut entries = self.store.read_all_entries()?;
        entries.retain(|e| e.status == Status::Pending);
        if let Some(conv) = conversation_id {
            entries.retain(|e| &e.conversation_id == conv);
        }
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(entries)
    }

    /// Resolves a CLI-supplied prefix against both edit and conversation
    /// identifiers. An edit-id match wins only when it is unambiguous under
    /// both namespaces; otherwise the caller must disambiguate.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<IdentifierResolution> {
        let entries = self.store.read_all_entries()?;

        let matching_edits: Vec<EditId> =
            entries.iter().map(|e| e.edit_id.clone()).filter(|id| id.starts_with(prefix)).collect();
        let matching_convs: BTreeSet<ConversationId> = entries
            .iter()
            .map(|e| e.conversation_id.clone())
            .filter(|id| id.starts_with(prefix))
            .collect();
        let matching_convs: Vec<ConversationId> = matching_convs.into_iter().collect();

        match (matching_edits.len(), matching_convs.len()) {
            (0, 0) => Ok(IdentifierResolution::None),
            (1, 0) => Ok(IdentifierResolution::Edit(matching_edits[0].clone())),
            (0, 1) => Ok(IdentifierResolution::Conversation(matching_convs[0].clone())),
            (1, 1) => Ok(IdentifierResolution::Edit(matching_edits[0].clone())),
            _ => Ok(IdentifierResolution::Ambiguous { edits: matching_edits, conversations: matching_convs }),
        }
    }

    /// The diff bytes recorded for one edit, or `None` if it changed no
    /// content (e.g. `delete`, `move`).
    pub fn diff_for_edit(&self, edit_id: &EditId) -> Result<Option<Vec<u8>>> {
        let entry = self.find_entry(edit_id)?;
        match entry.detail.diff_file() {
            Some(rel) => Ok(Some(self.store.read_diff(&self.store.absolute(rel))?)),
            None => Ok(None),
        }
    }

    /// Every content-changing diff in a conversation, in `tool_call_index`
    /// order.
    pub fn diffs_for_conversation(&self, conversation_id: &ConversationId) -> Result<Vec<(EditEntry, Vec<u8>)>> {
        let mut entries = self.store.read_log(conversation_id)?;
        entries.sort_by_key(|e| e.tool_call_index);
        let mut out = Vec::new();
        for entry in entries {
            if let Some(rel) = entry.detail.diff_file() {
                let bytes = self.store.read_diff(&self.store.absolute(rel))?;
                out.push((entry, bytes));
            }
        }
        Ok(out)
    }

    fn find_entry(&self, edit_id: &EditId) -> Result<EditEntry> {
        self.store
            .read_all_entries()?
            .into_iter()
            .find(|e| &e.edit_id == edit_id)
            .ok_or_else(|| EngineError::NoSuchIdentifier { prefix: edit_id.to_string() })
    }

    /// Flips one edit's status and re-materializes the file(s) it affects.
    /// Replay-first, flip-on-success: the log is flipped before replay runs,
    /// and rolled back — along with the file, from a `.chkpt.revert`
    /// snapshot — if replay fails.
    pub fn set_status(
        &self,
        edit_id: &EditId,
        new_status: Status,
        resolver: &dyn ExternalChangeResolver,
    ) -> Result<replay::ReplayReport> {
        let entry = self.find_entry(edit_id)?;
        self.flip_and_replay(&entry.conversation_id, |e| e.edit_id == *edit_id, new_status, &entry.file_path, resolver)
    }

    /// As [`Self::set_status`], but flips and replays every edit in a
    /// conversation, re-materializing every distinct file it touched.
    pub fn set_status_for_conversation(
        &self,
        conversation_id: &ConversationId,
        new_status: Status,
        resolver: &dyn ExternalChangeResolver,
    ) -> Result<Vec<replay::ReplayReport>> {
        let entries = self.store.read_log(conversation_id)?;
        let mut current_names: BTreeSet<PathBuf> = BTreeSet::new();
        for e in &entries {
            current_names.insert(e.file_path.clone());
        }

        let mut old_statuses = Vec::new();
        for e in &entries {
            old_statuses.push((e.edit_id.clone(), e.status));
        }

        let mut snapshots = Vec::new();
        for path in &current_names {
            snapshots.push((path.clone(), std::fs::read(path).ok()));
        }
        for (path, bytes) in &snapshots {
            if let Some(b) = bytes {
                self.store.write_revert_snapshot(conversation_id, path, b)?;
            }
        }

        let log_lock = lock::acquire(
            &self.store.log_path(conversation_id),
            self.config.lock_timeout(),
            self.config.stale_lock_age(),
        )?;
        self.store.rewrite_log(conversation_id, |e| e.status = new_status)?;
        drop(log_lock);

        let mut reports = Vec::new();
        let mut failure = None;
        for path in &current_names {
            match replay::replay(&self.store, conversation_id, path, resolver, self.config.lock_timeout(), self.config.stale_lock_age()) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(err) = failure {
            self.rollback(conversation_id, &old_statuses, &snapshots)?;
            return Err(err);
        }

        info!(conversation = %conversation_id, status = ?new_status, "conversation status flipped and replayed");
        Ok(reports)
    }

    pub fn cleanup(&self) -> Result<usize> {
        tracker::cleanup_stale_locks(&self.config.workspace_root, &self.store.history_root())
    }

    fn flip_and_replay(
        &self,
        conversation_id: &ConversationId,
        matches: impl Fn(&EditEntry) -> bool,
        new_status: Status,
        file_path: &Path,
        resolver: &dyn ExternalChangeResolver,
    ) -> Result<replay::ReplayReport> {
        let old_bytes = std::fs::read(file_path).ok();
        if let Some(b) = &old_bytes {
            self.store.write_revert_snapshot(conversation_id, file_path, b)?;
        }
        let entries = self.store.read_log(conversation_id)?;
        let old_statuses: Vec<(EditId, Status)> = entries.iter().map(|e| (e.edit_id.clone(), e.status)).collect();

        let log_lock =
            lock::acquire(&self.store.log_path(conversation_id), self.config.lock_timeout(), self.config.stale_lock_age())?;
        self.store.rewrite_log(conversation_id, |e| {
            if matches(e) {
                e.status = new_status;
            }
        })?;
        drop(log_lock);

        match replay::replay(&self.store, conversation_id, file_path, resolver, self.config.lock_timeout(), self.config.stale_lock_age()) {
            Ok(report) => {
                info!(conversation = %conversation_id, path = %file_path.display(), status = ?new_status, "edit status flipped and replayed");
                Ok(report)
            }
            Err(e) => {
                self.rollback(conversation_id, &old_statuses, &[(file_path.to_path_buf(), old_bytes)])?;
                Err(e)
            }
        }
    }

    fn rollback(
        &self,
        conversation_id: &ConversationId,
        old_statuses: &[(EditId, Status)],
        snapshots: &[(PathBuf, Option<Vec<u8>>)],
    ) -> Result<()> {
        let log_lock =
            lock::acquire(&self.store.log_path(conversation_id), self.config.lock_timeout(), self.config.stale_lock_age())?;
        self.store.rewrite_log(conversation_id, |e| {
            if let Some((_, status)) = old_statuses.iter().find(|(id, _)| *id == e.edit_id) {
                e.status = *status;
            }
        })?;
        drop(log_lock);

        for (path, bytes) in snapshots {
            match bytes {
                Some(b) => std::fs::write(path, b)?,
                None => {
                    if path.exists() {
                        std::fs::remove_file(path)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::unified_diff;
    use crate::model::OperationDetail;
    use crate::replay::AlwaysAbort;
    use tempfile::TempDir;
    use time::OffsetDateTime;

    fn reviewer_in(dir: &TempDir) -> Reviewer {
        let cfg = EngineConfig::new(dir.path());
        let store = HistoryStore::new(&cfg);
        Reviewer::new(cfg, store)
    }

    fn push_replace(store: &HistoryStore, conv: &ConversationId, idx: u64, path: &Path, old: &[u8], new: &[u8], status: Status) -> EditId {
        let checkpoint = if idx == 0 {
            Some(store.relative_to_root(&store.write_checkpoint_if_absent(conv, path, old).unwrap()))
        } else {
            None
        };
        let diff = unified_diff(old, new, "f");
        let diff_rel = store.relative_to_root(&store.write_diff(conv, &format!("e{idx}"), &diff).unwrap());
        let edit_id = EditId::new(format!("e{idx}"));
        let entry = EditEntry {
            edit_id: edit_id.clone(),
            conversation_id: conv.clone(),
            tool_call_index: idx,
            timestamp: OffsetDateTime::now_utc(),
            tool_name: "edit_file".into(),
            status,
            file_path: path.to_path_buf(),
            hash_before: Some(crate::hash::ContentHash::of_bytes(old)),
            hash_after: Some(crate::hash::ContentHash::of_bytes(new)),
            detail: OperationDetail::Replace { diff_file: Some(diff_rel), checkpoint_file: checkpoint },
        };
        store.append_log_entry(conv, &entry).unwrap();
        edit_id
    }

    #[test]
    fn status_defaults_to_newest_first_with_limit() {
        let dir = TempDir::new().unwrap();
        let reviewer = reviewer_in(&dir);
        let conv = ConversationId::new("c1");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"two\n").unwrap();
        push_replace(reviewer.store(), &conv, 0, &path, b"one\n", b"two\n", Status::Pending);

        let entries = reviewer.status(&StatusFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn empty_workspace_status_is_empty() {
        let dir = TempDir::new().unwrap();
        let reviewer = reviewer_in(&dir);
        assert!(reviewer.status(&StatusFilter::default()).unwrap().is_empty());
        assert_eq!(reviewer.cleanup().unwrap(), 0);
    }

    #[test]
    fn resolve_prefix_unique_edit() {
        let dir = TempDir::new().unwrap();
        let reviewer = reviewer_in(&dir);
        let conv = ConversationId::new("conversation-one");
        let path = dir.path().join("a.txt");
        push_replace(reviewer.store(), &conv, 0, &path, b"one\n", b"two\n", Status::Pending);

        let resolution = reviewer.resolve_prefix("e0").unwrap();
        assert_eq!(resolution, IdentifierResolution::Edit(EditId::new("e0")));
    }

    #[test]
    fn resolve_prefix_no_match_is_none() {
        let dir = TempDir::new().unwrap();
        let reviewer = reviewer_in(&dir);
        assert_eq!(reviewer.resolve_prefix("nope").unwrap(), IdentifierResolution::None);
    }

    #[test]
    fn accept_then_reject_is_idempotent_with_never_accepting() {
        let dir = TempDir::new().unwrap();
        let reviewer = reviewer_in(&dir);
        let conv = ConversationId::new("c1");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"two\n").unwrap();
        let edit_id = push_replace(reviewer.store(), &conv, 0, &path, b"one\n", b"two\n", Status::Pending);

        reviewer.set_status(&edit_id, Status::Accepted, &AlwaysAbort).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two\n");

        reviewer.set_status(&edit_id, Status::Rejected, &AlwaysAbort).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"one\n");
    }

    #[test]
    fn rejecting_whole_conversation_restores_every_file() {
        let dir = TempDir::new().unwrap();
        let reviewer = reviewer_in(&dir);
        let conv = ConversationId::new("c1");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"two\n").unwrap();
        push_replace(reviewer.store(), &conv, 0, &path, b"one\n", b"two\n", Status::Pending);

        reviewer.set_status_for_conversation(&conv, Status::Rejected, &AlwaysAbort).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"one\n");

        let entries = reviewer.status(&StatusFilter { conversation_id: Some(conv.clone()), ..Default::default() }).unwrap();
        assert!(entries.iter().all(|e| e.status == Status::Rejected));
    }
}
