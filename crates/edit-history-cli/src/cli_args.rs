use std::path::PathBuf;

use clap::{Parser, Subcommand};
use edit_history_engine::Status;

/// Reviewer CLI for the edit history engine: list, inspect, accept or
/// reject LM-driven edits, and reconcile stale locks.
#[derive(Parser, Debug)]
#[clap(name = "edit-history", about = "Review and replay LM-driven file edits")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root (auto-detected upward from the current directory by
    /// default, looking for `.mcp/edit_history`).
    #[arg(short = 'w', long = "workspace", global = true)]
    pub workspace: Option<PathBuf>,

    /// Emit verbose diagnostic logging (equivalent to `MCP_DEBUG=1`).
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Lock acquisition timeout, in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Reclaim every stale lock found, bypassing the normal debounce.
    #[arg(long, global = true)]
    pub force_cleanup: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List entries, newest first.
    #[clap(alias = "st")]
    Status {
        #[arg(long = "conv")]
        conversation: Option<String>,
        #[arg(long = "file")]
        file: Option<PathBuf>,
        #[arg(long = "status", value_enum)]
        status: Option<StatusArg>,
        /// Only show entries newer than this age, e.g. `30m`, `2h`, `1d`.
        #[arg(long = "time")]
        time: Option<String>,
        /// Maximum entries to print; `0` removes the limit.
        #[arg(short = 'n', long, default_value_t = edit_history_engine::reviewer::DEFAULT_STATUS_LIMIT)]
        limit: usize,
    },
    /// Print the diff for an edit, or every diff in a conversation.
    #[clap(alias = "sh", visible_alias = "s")]
    Show { identifier: String },
    /// Flip an edit or a whole conversation to accepted and re-materialize.
    #[clap(alias = "a")]
    Accept {
        #[arg(short = 'e', long, conflicts_with = "conversation")]
        edit: Option<String>,
        #[arg(short = 'c', long)]
        conversation: Option<String>,
    },
    /// Flip an edit or a whole conversation to rejected and re-materialize.
    #[clap(alias = "r")]
    Reject {
        #[arg(short = 'e', long, conflicts_with = "conversation")]
        edit: Option<String>,
        #[arg(short = 'c', long)]
        conversation: Option<String>,
    },
    /// Interactive loop over pending edits, oldest first.
    #[clap(alias = "v")]
    Review {
        #[arg(short = 'c', long = "conv")]
        conversation: Option<String>,
    },
    /// Remove stale locks in the history store.
    #[clap(alias = "clean")]
    Cleanup,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum StatusArg {
    Pending,
    Accepted,
    Rejected,
}

impl From<StatusArg> for Status {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Pending => Status::Pending,
            StatusArg::Accepted => Status::Accepted,
            StatusArg::Rejected => Status::Rejected,
        }
    }
}
