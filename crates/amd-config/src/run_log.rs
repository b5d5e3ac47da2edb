//! Run Record persistence (spec.md §3 "Run Record...persisted as opaque
//! history"): append-only JSONL under `<system_root>/state/`, one line per
//! completed run, the same append/rewrite split as `PendingStore`.

use std::path::{Path, PathBuf};

use amd_core::{EngineError, Result, RunRecord};

const RUN_LOG_FILE: &str = "runs.jsonl";

pub struct RunLog {
    file_path: PathBuf,
}

impl RunLog {
    pub fn new(system_root: &Path) -> Self {
        Self {
            file_path: system_root.join("state").join(RUN_LOG_FILE),
        }
    }

    pub fn append(&self, record: &RunRecord) -> Result<()> {
        use std::io::Write;
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(record)
            .map_err(|e| EngineError::ConfigRepairNeeded(e.to_string()))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Most recent `n` runs for `global_id`, newest first (spec.md
    /// `@recent_runs`).
    pub fn recent(&self, global_id: &str, n: usize) -> Result<Vec<RunRecord>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.file_path)?;
        let mut matching: Vec<RunRecord> = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunRecord>(line) {
                Ok(record) if record.global_id == global_id => matching.push(record),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(line_number = idx + 1, %e, "skipping corrupt run-record line");
                }
            }
        }
        matching.reverse();
        matching.truncate(n);
        Ok(matching)
    }
}
