//! Filesystem tool-server front door: exposes the mutation tool contracts
//! (write, edit, move, delete) as callable tools over a `Tool`/`ToolContext`
//! abstraction, translating tool arguments into `Tracker::track` invocations
//! and results back into JSON.
//!
//! The abstraction here is modeled on `crates/agent/src/tools/context.rs`'s
//! `Tool`/`ToolContext` traits, trimmed to what a mutation tool actually
//! needs (no agent registry, no elicitation channel, no delegation) — those
//! concerns belong to the interactive agent runtime this crate sits beside,
//! not to the engine's own front door.

pub mod context;
pub mod schema;
pub mod tools;

pub use context::{FsToolContext, ToolContext, ToolError};
pub use schema::{FunctionTool, ToolDefinition};
pub use tools::{DeleteFileTool, EditFileTool, MoveFileTool, WriteFileTool, all_tools};
