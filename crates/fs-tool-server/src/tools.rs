//! The four mutation tools (write, edit — line-selector or anchored, move,
//! delete), each wrapping `Tracker::track` and shaped after
//! `crates/agent/src/tools/builtins/` (`write_file.rs`, `edit.rs`,
//! `multiedit.rs`, `delete_file.rs`).

use async_trait::async_trait;
use serde_json::{Value, json};

use edit_history_engine::edits::{AnchoredEdit, parse_selector};
use edit_history_engine::{MutationKind, MutationRequest};

use crate::context::{ToolContext, ToolError};
use crate::schema::{FunctionTool, ToolDefinition};

/// A callable mutation tool: name, JSON-schema definition, and the call that
/// dispatches into the tracker.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn definition(&self) -> ToolDefinition;
    async fn call(&self, args: Value, context: &dyn ToolContext) -> Result<String, ToolError>;
}

fn require_read_write(context: &dyn ToolContext) -> Result<(), ToolError> {
    if context.is_read_only() {
        return Err(ToolError::PermissionDenied("workspace is read-only".into()));
    }
    Ok(())
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidRequest(format!("`{key}` is required")))
}

fn outcome_json(outcome: &edit_history_engine::MutationOutcome) -> Result<String, ToolError> {
    let value = json!({
        "conversation_id": outcome.conversation_id.as_str(),
        "conversation_started": outcome.conversation_started,
        "edit_id": outcome.edit_id.as_ref().map(|id| id.as_str().to_string()),
        "operation": outcome.operation,
        "hash_before": outcome.hash_before.as_ref().map(|h| h.as_str().to_string()),
        "hash_after": outcome.hash_after.as_ref().map(|h| h.as_str().to_string()),
        "diff": outcome.diff.as_ref().map(|d| String::from_utf8_lossy(d).to_string()),
    });
    serde_json::to_string(&value).map_err(|e| ToolError::InvalidRequest(format!("failed to serialize result: {e}")))
}

/// Whole-file write: `create` if `path` is absent, `replace` otherwise.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionTool {
                name: self.name().to_string(),
                description: "Write whole-file content, tracked as create or replace.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "File path to write." },
                        "content": { "type": "string", "description": "Content to write." }
                    },
                    "required": ["path", "content"]
                }),
            },
        }
    }

    async fn call(&self, args: Value, context: &dyn ToolContext) -> Result<String, ToolError> {
        require_read_write(context)?;
        let path = context.resolve_path(arg_str(&args, "path")?)?;
        let content = arg_str(&args, "content")?.as_bytes().to_vec();

        let outcome = context.tracker().track(MutationRequest {
            target: path,
            source_path: None,
            kind: MutationKind::Write { content },
            tool_name: self.name().to_string(),
            conversation_id: context.conversation_id(),
        })?;
        outcome_json(&outcome)
    }
}

/// Line-specified and content-anchored edits share the `edit` operation tag;
/// the tool call picks one shape based on which arguments are present.
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionTool {
                name: self.name().to_string(),
                description:
                    "Edit a file either by line selector (\"N\", \"N-M\", \"Ni\", \"a\") or by literal anchor substring."
                        .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "File path to edit." },
                        "line_edits": {
                            "type": "object",
                            "description": "Map of line selector to replacement text, resolved against the file's original line numbering.",
                            "additionalProperties": { "type": "string" }
                        },
                        "replacements": {
                            "type": "object",
                            "description": "Map of literal existing substring to replacement text.",
                            "additionalProperties": { "type": "string" }
                        },
                        "inserts": {
                            "type": "object",
                            "description": "Map of anchor substring to content inserted immediately after it.",
                            "additionalProperties": { "type": "string" }
                        },
                        "replace_all": {
                            "type": "boolean",
                            "description": "Replace every occurrence of each substring rather than only the first.",
                            "default": false
                        },
                        "dry_run": {
                            "type": "boolean",
                            "description": "Compute and return the diff without writing the file or logging an edit.",
                            "default": false
                        }
                    },
                    "required": ["path"]
                }),
            },
        }
    }

    async fn call(&self, args: Value, context: &dyn ToolContext) -> Result<String, ToolError> {
        require_read_write(context)?;
        let path = context.resolve_path(arg_str(&args, "path")?)?;

        if let Some(line_edits) = args.get("line_edits").and_then(Value::as_object) {
            let mut edits = Vec::with_capacity(line_edits.len());
            for (selector, text) in line_edits {
                let text = text
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidRequest(format!("line_edits[\"{selector}\"] must be a string")))?;
                let selector = parse_selector(selector)?;
                edits.push((selector, text.to_string()));
            }

            let outcome = context.tracker().track(MutationRequest {
                target: path,
                source_path: None,
                kind: MutationKind::LineEdit { edits },
                tool_name: self.name().to_string(),
                conversation_id: context.conversation_id(),
            })?;
            return outcome_json(&outcome);
        }

        let mut replacements = Vec::new();
        if let Some(map) = args.get("replacements").and_then(Value::as_object) {
            for (find, replace) in map {
                let replace = replace
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidRequest(format!("replacements[\"{find}\"] must be a string")))?;
                replacements.push((find.clone(), replace.to_string()));
            }
        }
        let mut inserts = Vec::new();
        if let Some(map) = args.get("inserts").and_then(Value::as_object) {
            for (anchor, insertion) in map {
                let insertion = insertion
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidRequest(format!("inserts[\"{anchor}\"] must be a string")))?;
                inserts.push((anchor.clone(), insertion.to_string()));
            }
        }
        if replacements.is_empty() && inserts.is_empty() {
            return Err(ToolError::InvalidRequest(
                "one of `line_edits` or `replacements`/`inserts` is required".to_string(),
            ));
        }
        let replace_all = args.get("replace_all").and_then(Value::as_bool).unwrap_or(false);
        let dry_run = args.get("dry_run").and_then(Value::as_bool).unwrap_or(false);

        let outcome = context.tracker().track(MutationRequest {
            target: path,
            source_path: None,
            kind: MutationKind::AnchoredEdit {
                edit: AnchoredEdit { replacements, inserts, replace_all },
                dry_run,
            },
            tool_name: self.name().to_string(),
            conversation_id: context.conversation_id(),
        })?;
        outcome_json(&outcome)
    }
}

pub struct MoveFileTool;

#[async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &str {
        "move_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionTool {
                name: self.name().to_string(),
                description: "Rename or move a tracked file; refuses if the destination already exists.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "source": { "type": "string", "description": "Current file path." },
                        "destination": { "type": "string", "description": "Target file path." }
                    },
                    "required": ["source", "destination"]
                }),
            },
        }
    }

    async fn call(&self, args: Value, context: &dyn ToolContext) -> Result<String, ToolError> {
        require_read_write(context)?;
        let source = context.resolve_path(arg_str(&args, "source")?)?;
        let destination = context.resolve_path(arg_str(&args, "destination")?)?;

        let outcome = context.tracker().track(MutationRequest {
            target: destination,
            source_path: Some(source),
            kind: MutationKind::Move,
            tool_name: self.name().to_string(),
            conversation_id: context.conversation_id(),
        })?;
        outcome_json(&outcome)
    }
}

pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionTool {
                name: self.name().to_string(),
                description: "Delete a tracked file.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "File path to delete." }
                    },
                    "required": ["path"]
                }),
            },
        }
    }

    async fn call(&self, args: Value, context: &dyn ToolContext) -> Result<String, ToolError> {
        require_read_write(context)?;
        let path = context.resolve_path(arg_str(&args, "path")?)?;

        let outcome = context.tracker().track(MutationRequest {
            target: path,
            source_path: None,
            kind: MutationKind::Delete,
            tool_name: self.name().to_string(),
            conversation_id: context.conversation_id(),
        })?;
        outcome_json(&outcome)
    }
}

pub fn all_tools() -> Vec<Box<dyn Tool>> {
    vec![Box::new(WriteFileTool), Box::new(EditFileTool), Box::new(MoveFileTool), Box::new(DeleteFileTool)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FsToolContext;
    use edit_history_engine::{EngineConfig, SingleRootAllowlist, Tracker};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context_in(dir: &TempDir) -> FsToolContext {
        let cfg = EngineConfig::new(dir.path());
        let allowlist = Box::new(SingleRootAllowlist::new(dir.path()).unwrap());
        let tracker = Arc::new(Tracker::new(cfg, allowlist));
        FsToolContext::new(dir.path().to_path_buf(), tracker)
    }

    #[tokio::test]
    async fn write_then_edit_then_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let context = context_in(&dir);

        let write = WriteFileTool;
        let write_result = write
            .call(json!({"path": "a.txt", "content": "one\ntwo\n"}), &context)
            .await
            .unwrap();
        let write_value: Value = serde_json::from_str(&write_result).unwrap();
        assert_eq!(write_value["operation"], "create");
        let conversation_id = write_value["conversation_id"].as_str().unwrap().to_string();

        let context = context.with_conversation(edit_history_engine::ConversationId::new(conversation_id));

        let edit = EditFileTool;
        let edit_result = edit
            .call(json!({"path": "a.txt", "line_edits": {"2": "TWO\n"}}), &context)
            .await
            .unwrap();
        let edit_value: Value = serde_json::from_str(&edit_result).unwrap();
        assert_eq!(edit_value["operation"], "edit");
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\nTWO\n");

        let delete = DeleteFileTool;
        delete.call(json!({"path": "a.txt"}), &context).await.unwrap();
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn read_only_context_rejects_write() {
        let dir = TempDir::new().unwrap();
        let context = context_in(&dir).with_read_only(true);
        let write = WriteFileTool;
        let result = write.call(json!({"path": "a.txt", "content": "x"}), &context).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn anchored_dry_run_does_not_write() {
        let dir = TempDir::new().unwrap();
        let context = context_in(&dir);
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();

        let edit = EditFileTool;
        let result = edit
            .call(
                json!({"path": "a.txt", "replacements": {"hello": "goodbye"}, "dry_run": true}),
                &context,
            )
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&result).unwrap();
        assert!(value["diff"].as_str().unwrap().contains("goodbye"));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "hello\n");
    }
}
