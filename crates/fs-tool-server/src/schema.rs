//! Tool-definition wire types: the minimal JSON-schema shape an LM tool
//! front door advertises to callers. Shaped after
//! `crates/agent/src/tools/context.rs`'s tool-definition struct rather than
//! pulling in a full LLM client crate for two small, stable structs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function the tool server exposes, named and described with a JSON
/// Schema object for its arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One entry in a tool-call manifest. `tool_type` is always `"function"`
/// today; the field exists so the wire shape matches callers that expect a
/// tagged union of tool kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionTool,
}
