//! Workspace root discovery: walks upward from the current directory
//! looking for `.mcp/edit_history`, the same convention
//! `edit_history_engine::config` uses to name the history subtree.

use std::path::PathBuf;

pub fn discover(explicit: Option<PathBuf>, history_dir_name: &str) -> anyhow::Result<PathBuf> {
    if let Some(root) = explicit {
        return Ok(root);
    }

    let mut dir = std::env::current_dir()?;
    loop {
        if dir.join(history_dir_name).is_dir() {
            return Ok(dir);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(anyhow::anyhow!(
        "could not find `{history_dir_name}` above the current directory; pass `--workspace` explicitly"
    ))
}
