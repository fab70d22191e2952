//! Explicit engine configuration.
//!
//! Constructed programmatically by embedders (the tool-server, the reviewer
//! CLI, tests); the `Deserialize` impl exists for embedders that want to
//! load it from their own TOML config rather than build it field by field.
//! Only `MCP_DEBUG` is ever read from the environment directly by the
//! engine; everything else lives here.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STALE_LOCK_AGE_SECS: u64 = 5;
pub const DEFAULT_LOG_SIZE_WARNING_BYTES: u64 = 50 * 1024 * 1024;

const fn default_lock_timeout_secs() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

const fn default_stale_lock_age_secs() -> u64 {
    DEFAULT_STALE_LOCK_AGE_SECS
}

const fn default_log_size_warning_bytes() -> u64 {
    DEFAULT_LOG_SIZE_WARNING_BYTES
}

fn default_history_dir_name() -> String {
    ".mcp/edit_history".to_string()
}

/// Configuration for one [`crate::Engine`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root of the workspace this engine governs. Must be absolute.
    pub workspace_root: PathBuf,

    /// Seconds to wait for a file lock before surfacing `LockTimeout`.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Minimum age, in seconds, before a PID-dead lock is considered stale
    /// and reclaimable. Debounces races with a slow acquirer.
    #[serde(default = "default_stale_lock_age_secs")]
    pub stale_lock_age_secs: u64,

    /// Log files larger than this emit a warning (not an error) on append.
    #[serde(default = "default_log_size_warning_bytes")]
    pub log_size_warning_bytes: u64,

    /// Name of the hidden history subtree, relative to `workspace_root`.
    /// Overridable so integration tests can point multiple engines at
    /// distinct history roots inside one temp directory.
    #[serde(default = "default_history_dir_name")]
    pub history_dir_name: String,
}

impl EngineConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            stale_lock_age_secs: DEFAULT_STALE_LOCK_AGE_SECS,
            log_size_warning_bytes: DEFAULT_LOG_SIZE_WARNING_BYTES,
            history_dir_name: default_history_dir_name(),
        }
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn stale_lock_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stale_lock_age_secs)
    }

    pub fn history_root(&self) -> PathBuf {
        self.workspace_root.join(&self.history_dir_name)
    }

    /// Whether verbose diagnostic logging was requested via `MCP_DEBUG=1`.
    pub fn debug_enabled() -> bool {
        std::env::var("MCP_DEBUG").as_deref() == Ok("1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::new("/tmp/ws");
        assert_eq!(cfg.lock_timeout_secs, 10);
        assert_eq!(cfg.stale_lock_age_secs, 5);
        assert_eq!(cfg.history_root(), PathBuf::from("/tmp/ws/.mcp/edit_history"));
    }

    #[test]
    fn deserializes_with_partial_toml() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            workspace_root = "/tmp/ws"
            lock_timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.lock_timeout_secs, 30);
        assert_eq!(cfg.stale_lock_age_secs, DEFAULT_STALE_LOCK_AGE_SECS);
    }
}
