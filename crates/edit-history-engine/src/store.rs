//! On-disk layout and persistence discipline for `.mcp/edit_history/`.
//!
//! All writes that must be crash-safe go through the same discipline: write
//! to a sibling temp file, `fsync`, then `rename` into place. The rename is
//! the commit point.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::hash::ContentHash;
use crate::ids::ConversationId;
use crate::model::EditEntry;

pub struct HistoryStore {
    history_root: PathBuf,
    log_size_warning_bytes: u64,
}

impl HistoryStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            history_root: config.history_root(),
            log_size_warning_bytes: config.log_size_warning_bytes,
        }
    }

    pub fn history_root(&self) -> &Path {
        &self.history_root
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.history_root.join("logs")
    }

    pub fn diffs_dir(&self, conversation_id: &ConversationId) -> PathBuf {
        self.history_root.join("diffs").join(conversation_id.as_str())
    }

    pub fn checkpoints_dir(&self, conversation_id: &ConversationId) -> PathBuf {
        self.history_root.join("checkpoints").join(conversation_id.as_str())
    }

    pub fn log_path(&self, conversation_id: &ConversationId) -> PathBuf {
        self.logs_dir().join(format!("{}.log", conversation_id.as_str()))
    }

    pub fn diff_path(&self, conversation_id: &ConversationId, edit_id: &str) -> PathBuf {
        self.diffs_dir(conversation_id).join(format!("{edit_id}.diff"))
    }

    pub fn checkpoint_path(&self, conversation_id: &ConversationId, original_path: &Path) -> PathBuf {
        self.checkpoints_dir(conversation_id)
            .join(format!("{}.chkpt", sanitize_path(original_path)))
    }

    pub fn revert_checkpoint_path(&self, conversation_id: &ConversationId, original_path: &Path) -> PathBuf {
        self.checkpoints_dir(conversation_id)
            .join(format!("{}.chkpt.revert", sanitize_path(original_path)))
    }

    pub fn all_conversation_ids(&self) -> Result<Vec<ConversationId>> {
        let dir = self.logs_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("log") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(ConversationId::new(stem));
                }
            }
        }
        Ok(ids)
    }

    /// Reads all entries for a conversation. Tolerates a trailing partial
    /// line left by a concurrent writer mid-append; any other malformed line
    /// is a hard error, since that indicates corruption rather than a race.
    pub fn read_log(&self, conversation_id: &ConversationId) -> Result<Vec<EditEntry>> {
        let path = self.log_path(conversation_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = raw.lines().collect();
        let mut entries = Vec::with_capacity(lines.len());

        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match EditEntry::from_json_line(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    let is_last = idx == lines.len() - 1;
                    let ends_with_newline = raw.ends_with('\n');
                    if is_last && !ends_with_newline {
                        warn!(path = %path.display(), "discarding unterminated trailing log line");
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(entries)
    }

    /// Reads every log entry across every conversation. Used by the
    /// hash-integrity preflight, which must find the most recent
    /// `hash_after` for a path regardless of which conversation wrote it.
    pub fn read_all_entries(&self) -> Result<Vec<EditEntry>> {
        let mut all = Vec::new();
        for conv in self.all_conversation_ids()? {
            all.extend(self.read_log(&conv)?);
        }
        Ok(all)
    }

    /// Appends one entry. Caller must already hold the conversation's log
    /// lock; this function performs no locking of its own.
    pub fn append_log_entry(&self, conversation_id: &ConversationId, entry: &EditEntry) -> Result<()> {
        let path = self.log_path(conversation_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let line = entry.to_json_line()?;
        writeln!(file, "{line}")?;
        file.sync_all()?;

        if let Ok(meta) = file.metadata() {
            if meta.len() > self.log_size_warning_bytes {
                warn!(
                    path = %path.display(),
                    bytes = meta.len(),
                    "log file exceeds configured warning threshold"
                );
            }
        }
        Ok(())
    }

    /// Rewrites every entry for a conversation via temp-file-then-rename,
    /// after applying `transform` to each in memory. Caller must hold the
    /// conversation's log lock.
    pub fn rewrite_log(
        &self,
        conversation_id: &ConversationId,
        mut transform: impl FnMut(&mut EditEntry),
    ) -> Result<()> {
        let mut entries = self.read_log(conversation_id)?;
        for entry in &mut entries {
            transform(entry);
        }

        let path = self.log_path(conversation_id);
        let tmp_path = path.with_extension("log.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for entry in &entries {
                writeln!(tmp, "{}", entry.to_json_line()?)?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Idempotent: a second checkpoint for the same (conversation, path) is a
    /// no-op, since the checkpoint already records the state immediately
    /// before the conversation's first touch.
    pub fn write_checkpoint_if_absent(
        &self,
        conversation_id: &ConversationId,
        original_path: &Path,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.checkpoint_path(conversation_id, original_path);
        if path.exists() {
            return Ok(path);
        }
        atomic_write(&path, bytes)?;
        Ok(path)
    }

    pub fn read_checkpoint(&self, checkpoint_path: &Path) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        File::open(checkpoint_path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn write_revert_snapshot(
        &self,
        conversation_id: &ConversationId,
        original_path: &Path,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.revert_checkpoint_path(conversation_id, original_path);
        atomic_write(&path, bytes)?;
        Ok(path)
    }

    pub fn write_diff(
        &self,
        conversation_id: &ConversationId,
        edit_id: &str,
        diff_bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.diff_path(conversation_id, edit_id);
        atomic_write(&path, diff_bytes)?;
        Ok(path)
    }

    pub fn read_diff(&self, diff_path: &Path) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        File::open(diff_path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Current on-disk hash of `path`, or `None` if it does not exist.
    pub fn current_hash(&self, path: &Path) -> Result<Option<ContentHash>> {
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(ContentHash::of_file(path)?))
    }

    /// Expresses an absolute path produced by this store (a diff or
    /// checkpoint path) relative to the history root, for storage in a log
    /// entry's `diff_file`/`checkpoint_file` fields.
    pub fn relative_to_root(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.history_root).unwrap_or(path).to_path_buf()
    }

    pub fn absolute(&self, relative: &Path) -> PathBuf {
        self.history_root.join(relative)
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Maps an absolute file path to a collision-free, filesystem-safe filename:
/// separators become `_`; if the result would exceed a conservative name
/// length, it is truncated and a hash suffix of the original path is
/// appended so two paths that truncate to the same prefix still differ.
pub fn sanitize_path(path: &Path) -> String {
    const MAX_NAME_LEN: usize = 200;

    let raw = path.to_string_lossy();
    let replaced: String = raw
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let replaced = replaced.trim_start_matches('_').to_string();

    if replaced.len() <= MAX_NAME_LEN {
        return replaced;
    }

    let suffix = ContentHash::of_bytes(raw.as_bytes());
    let suffix_str = &suffix.as_str()[..16];
    let keep = MAX_NAME_LEN.saturating_sub(suffix_str.len() + 1);
    format!("{}_{}", &replaced[..keep], suffix_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EditId;
    use crate::model::{OperationDetail, Status};
    use tempfile::TempDir;
    use time::OffsetDateTime;

    fn store_in(dir: &TempDir) -> HistoryStore {
        let cfg = EngineConfig::new(dir.path());
        HistoryStore::new(&cfg)
    }

    fn entry(conv: &str, idx: u64, status: Status) -> EditEntry {
        EditEntry {
            edit_id: EditId::new(format!("e{idx}")),
            conversation_id: ConversationId::new(conv),
            tool_call_index: idx,
            timestamp: OffsetDateTime::now_utc(),
            tool_name: "write_file".into(),
            status,
            file_path: "/ws/a.txt".into(),
            hash_before: None,
            hash_after: Some(ContentHash::of_bytes(b"x")),
            detail: OperationDetail::Create { diff_file: None, checkpoint_file: None },
        }
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let conv = ConversationId::new("c1");

        store.append_log_entry(&conv, &entry("c1", 0, Status::Pending)).unwrap();
        store.append_log_entry(&conv, &entry("c1", 1, Status::Pending)).unwrap();

        let entries = store.read_log(&conv).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tool_call_index, 0);
        assert_eq!(entries[1].tool_call_index, 1);
    }

    #[test]
    fn trailing_partial_line_is_discarded_not_errored() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let conv = ConversationId::new("c1");
        store.append_log_entry(&conv, &entry("c1", 0, Status::Pending)).unwrap();

        let path = store.log_path(&conv);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"edit_id\": \"broken").unwrap(); // no trailing newline

        let entries = store.read_log(&conv).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn rewrite_flips_status_atomically() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let conv = ConversationId::new("c1");
        store.append_log_entry(&conv, &entry("c1", 0, Status::Pending)).unwrap();

        store
            .rewrite_log(&conv, |e| {
                if e.edit_id.as_str() == "e0" {
                    e.status = Status::Accepted;
                }
            })
            .unwrap();

        let entries = store.read_log(&conv).unwrap();
        assert_eq!(entries[0].status, Status::Accepted);
    }

    #[test]
    fn checkpoint_write_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let conv = ConversationId::new("c1");
        let original = Path::new("/ws/a.txt");

        let p1 = store.write_checkpoint_if_absent(&conv, original, b"first").unwrap();
        let p2 = store.write_checkpoint_if_absent(&conv, original, b"second").unwrap();
        assert_eq!(p1, p2);
        assert_eq!(store.read_checkpoint(&p1).unwrap(), b"first");
    }

    #[test]
    fn sanitize_replaces_separators_and_is_stable() {
        let a = sanitize_path(Path::new("/ws/dir/file.txt"));
        assert!(!a.contains('/'));
        assert_eq!(a, sanitize_path(Path::new("/ws/dir/file.txt")));
    }

    #[test]
    fn sanitize_truncates_long_paths_with_distinct_suffixes() {
        let long_a = Path::new("/ws").join("a".repeat(300));
        let long_b = Path::new("/ws").join("b".repeat(300));
        let sa = sanitize_path(&long_a);
        let sb = sanitize_path(&long_b);
        assert_ne!(sa, sb);
        assert!(sa.len() <= 220);
    }
}
