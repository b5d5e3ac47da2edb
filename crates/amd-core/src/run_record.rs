//! Ephemeral run bookkeeping (spec.md §3 "Run Record").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vault::GlobalId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunCause {
    Scheduled,
    Manual,
    /// Single-step invocation, naming the step that was run.
    Step(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Completed,
    Skipped { reason: String },
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub step_name: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub global_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cause: RunCause,
    pub step_log: Vec<StepLogEntry>,
    pub output_files: Vec<String>,
    pub variables_created: Vec<String>,
    pub error: Option<RunError>,
}

impl RunRecord {
    pub fn new(global_id: &GlobalId, cause: RunCause, started_at: DateTime<Utc>) -> Self {
        Self {
            global_id: global_id.to_string(),
            started_at,
            finished_at: None,
            cause,
            step_log: Vec::new(),
            output_files: Vec::new(),
            variables_created: Vec::new(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
