//! The log-entry data model.
//!
//! `operation` is a tagged sum type rather than a dynamically-typed map: one
//! variant per mutation kind, each carrying exactly the fields that kind
//! requires. [`EditEntry`] serializes to and from the flat JSON-lines record
//! described in the on-disk format contract via an explicit wire struct
//! (below), rather than relying on an enum-derived shape that wouldn't match
//! the flat field table.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::hash::ContentHash;
use crate::ids::{ConversationId, EditId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Accepted,
    Rejected,
}

impl Status {
    /// `accepted` and `pending` are "apply" during replay; `rejected` is "skip".
    pub fn is_effectively_applied(self) -> bool {
        !matches!(self, Status::Rejected)
    }
}

/// One mutation, tagged by kind. Each variant carries exactly the extra
/// fields that operation needs beyond the common fields on [`EditEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationDetail {
    Create {
        diff_file: Option<PathBuf>,
        checkpoint_file: Option<PathBuf>,
    },
    Replace {
        diff_file: Option<PathBuf>,
        checkpoint_file: Option<PathBuf>,
    },
    Edit {
        diff_file: Option<PathBuf>,
        checkpoint_file: Option<PathBuf>,
    },
    Delete {
        checkpoint_file: Option<PathBuf>,
    },
    Move {
        source_path: PathBuf,
        checkpoint_file: Option<PathBuf>,
    },
}

impl OperationDetail {
    pub fn name(&self) -> &'static str {
        match self {
            OperationDetail::Create { .. } => "create",
            OperationDetail::Replace { .. } => "replace",
            OperationDetail::Edit { .. } => "edit",
            OperationDetail::Delete { .. } => "delete",
            OperationDetail::Move { .. } => "move",
        }
    }

    pub fn diff_file(&self) -> Option<&PathBuf> {
        match self {
            OperationDetail::Create { diff_file, .. }
            | OperationDetail::Replace { diff_file, .. }
            | OperationDetail::Edit { diff_file, .. } => diff_file.as_ref(),
            OperationDetail::Delete { .. } | OperationDetail::Move { .. } => None,
        }
    }

    pub fn checkpoint_file(&self) -> Option<&PathBuf> {
        match self {
            OperationDetail::Create { checkpoint_file, .. }
            | OperationDetail::Replace { checkpoint_file, .. }
            | OperationDetail::Edit { checkpoint_file, .. }
            | OperationDetail::Delete { checkpoint_file, .. }
            | OperationDetail::Move { checkpoint_file, .. } => checkpoint_file.as_ref(),
        }
    }

    pub fn source_path(&self) -> Option<&PathBuf> {
        match self {
            OperationDetail::Move { source_path, .. } => Some(source_path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEntry {
    pub edit_id: EditId,
    pub conversation_id: ConversationId,
    pub tool_call_index: u64,
    pub timestamp: OffsetDateTime,
    pub tool_name: String,
    pub status: Status,
    pub file_path: PathBuf,
    pub hash_before: Option<ContentHash>,
    pub hash_after: Option<ContentHash>,
    pub detail: OperationDetail,
}

impl EditEntry {
    /// Every name this entry mentions that could be a link in a file's
    /// identity chain: its own `file_path`, plus `source_path` for moves.
    pub fn touches(&self, path: &PathBuf) -> bool {
        &self.file_path == path || self.detail.source_path() == Some(path)
    }
}

/// The literal on-disk JSON-lines shape. A plain `#[derive]` on `EditEntry`
/// would either flatten `OperationDetail` into internally-tagged JSON (which
/// doesn't match the flat field table in the format contract) or require the
/// `operation` discriminant to live apart from the fields it governs; this
/// wire struct makes the flat mapping explicit instead.
#[derive(Debug, Serialize, Deserialize)]
struct EditEntryWire {
    edit_id: String,
    conversation_id: String,
    tool_call_index: u64,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    operation: String,
    file_path: PathBuf,
    source_path: Option<PathBuf>,
    tool_name: String,
    status: Status,
    diff_file: Option<PathBuf>,
    checkpoint_file: Option<PathBuf>,
    hash_before: Option<ContentHash>,
    hash_after: Option<ContentHash>,
}

impl From<&EditEntry> for EditEntryWire {
    fn from(e: &EditEntry) -> Self {
        EditEntryWire {
            edit_id: e.edit_id.as_str().to_string(),
            conversation_id: e.conversation_id.as_str().to_string(),
            tool_call_index: e.tool_call_index,
            timestamp: e.timestamp,
            operation: e.detail.name().to_string(),
            file_path: e.file_path.clone(),
            source_path: e.detail.source_path().cloned(),
            tool_name: e.tool_name.clone(),
            status: e.status,
            diff_file: e.detail.diff_file().cloned(),
            checkpoint_file: e.detail.checkpoint_file().cloned(),
            hash_before: e.hash_before.clone(),
            hash_after: e.hash_after.clone(),
        }
    }
}

impl TryFrom<EditEntryWire> for EditEntry {
    type Error = serde_json::Error;

    fn try_from(w: EditEntryWire) -> Result<Self, Self::Error> {
        use serde::de::Error as _;

        let detail = match w.operation.as_str() {
            "create" => OperationDetail::Create {
                diff_file: w.diff_file,
                checkpoint_file: w.checkpoint_file,
            },
            "replace" => OperationDetail::Replace {
                diff_file: w.diff_file,
                checkpoint_file: w.checkpoint_file,
            },
            "edit" => OperationDetail::Edit {
                diff_file: w.diff_file,
                checkpoint_file: w.checkpoint_file,
            },
            "delete" => OperationDetail::Delete {
                checkpoint_file: w.checkpoint_file,
            },
            "move" => {
                let source_path = w.source_path.ok_or_else(|| {
                    serde_json::Error::custom("move entry is missing source_path")
                })?;
                OperationDetail::Move {
                    source_path,
                    checkpoint_file: w.checkpoint_file,
                }
            }
            other => return Err(serde_json::Error::custom(format!("unknown operation `{other}`"))),
        };

        Ok(EditEntry {
            edit_id: EditId::new(w.edit_id),
            conversation_id: ConversationId::new(w.conversation_id),
            tool_call_index: w.tool_call_index,
            timestamp: w.timestamp,
            tool_name: w.tool_name,
            status: w.status,
            file_path: w.file_path,
            hash_before: w.hash_before,
            hash_after: w.hash_after,
            detail,
        })
    }
}

impl EditEntry {
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let wire = EditEntryWire::from(self);
        serde_json::to_string(&wire)
    }

    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        let wire: EditEntryWire = serde_json::from_str(line)?;
        EditEntry::try_from(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EditEntry {
        EditEntry {
            edit_id: EditId::new("e1"),
            conversation_id: ConversationId::new("c1"),
            tool_call_index: 0,
            timestamp: OffsetDateTime::now_utc(),
            tool_name: "write_file".to_string(),
            status: Status::Pending,
            file_path: "/ws/a.txt".into(),
            hash_before: None,
            hash_after: Some(ContentHash::of_bytes(b"hello\n")),
            detail: OperationDetail::Create {
                diff_file: Some("diffs/c1/e1.diff".into()),
                checkpoint_file: None,
            },
        }
    }

    #[test]
    fn round_trips_through_json_line() {
        let entry = sample();
        let line = entry.to_json_line().unwrap();
        assert!(!line.contains('\n'));
        let back = EditEntry::from_json_line(&line).unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn operation_field_is_the_string_tag() {
        let entry = sample();
        let line = entry.to_json_line().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["operation"], "create");
        assert_eq!(value["source_path"], serde_json::Value::Null);
    }

    #[test]
    fn move_without_source_path_fails_to_parse() {
        let mut entry = sample();
        entry.detail = OperationDetail::Move {
            source_path: "/ws/old.txt".into(),
            checkpoint_file: None,
        };
        entry.file_path = "/ws/new.txt".into();
        let mut value: serde_json::Value =
            serde_json::from_str(&entry.to_json_line().unwrap()).unwrap();
        value["source_path"] = serde_json::Value::Null;
        let result = EditEntry::from_json_line(&value.to_string());
        assert!(result.is_err());
    }

    #[test]
    fn rejected_is_not_effectively_applied() {
        assert!(Status::Accepted.is_effectively_applied());
        assert!(Status::Pending.is_effectively_applied());
        assert!(!Status::Rejected.is_effectively_applied());
    }
}
