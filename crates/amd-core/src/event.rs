//! Typed event sink shared by the LLM Gateway and the Tool Adapter, so a
//! streaming API layer can forward events verbatim without coupling to the
//! engine (Design Notes §9).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Delta { text: String },
    ToolCallStarted { id: String, name: String, args: serde_json::Value },
    ToolCallFinished { id: String, manifest: String },
    Done,
    Error { message: String },
}
