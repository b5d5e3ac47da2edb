//! Shared types for the AssistantMD execution engine: the error taxonomy,
//! vault sandboxing, the run record, and the small vocabulary (scope, write
//! mode, destination) that the directive parser, buffer store, and router
//! all need to agree on.

pub mod atomic_file;
pub mod error;
pub mod event;
pub mod routing;
pub mod run_record;
pub mod tool;
pub mod vault;
pub mod weekday;

pub use error::{EngineError, Result};
pub use event::EngineEvent;
pub use routing::{Destination, Scope, WriteMode};
pub use run_record::{RunCause, RunError, RunRecord, StepLogEntry, StepOutcome};
pub use tool::{ToolPart, ToolResult};
pub use vault::{GlobalId, Vault};
pub use weekday::{DayMask, WeekDay};
