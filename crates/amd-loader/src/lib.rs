//! J. Workflow Loader (spec.md §4.J): scans a vault's `Workflows` and
//! `ContextTemplates` directories one subdirectory level deep, parses each
//! file via `amd-directive`, and reports per-file success/failure without
//! aborting the whole scan on one bad file — grounded on the teacher's
//! `weave::batch::compile_all` walk-and-summarize shape.

use std::path::{Path, PathBuf};

use amd_core::{EngineError, GlobalId, Vault};
use amd_directive::{parse_document, Document};

/// Derived health of a loaded definition — never persisted, recomputed on
/// every rescan (SPEC_FULL.md §3 "[ADDED] WorkflowStatus").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowStatus {
    Valid,
    Invalid { reason: String },
    Unscheduled { reason: String },
}

#[derive(Debug, Clone)]
pub struct LoadedWorkflow {
    pub global_id: GlobalId,
    pub relative_path: PathBuf,
    pub document: Document,
    pub status: WorkflowStatus,
}

#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub relative_path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub workflows: Vec<LoadedWorkflow>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn find(&self, global_id: &GlobalId) -> Option<&LoadedWorkflow> {
        self.workflows.iter().find(|w| &w.global_id == global_id)
    }
}

/// Scan `dir` (either `vault.workflows_dir()` or
/// `vault.context_templates_dir()`) for `.md` files, one directory level
/// deep, skipping any directory whose name starts with `_`.
pub fn scan_directory(vault: &Vault, dir: &Path) -> LoadReport {
    let mut report = LoadReport::default();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return report,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if is_ignored_dir(&path) {
                continue;
            }
            scan_one_level(vault, &path, &mut report);
        } else if is_markdown(&path) {
            load_one(vault, &path, &mut report);
        }
    }
    report
}

fn scan_one_level(vault: &Vault, dir: &Path, report: &mut LoadReport) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && is_markdown(&path) {
            load_one(vault, &path, report);
        }
    }
}

fn is_ignored_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('_'))
        .unwrap_or(false)
}

fn is_markdown(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("md")
}

fn load_one(vault: &Vault, path: &Path, report: &mut LoadReport) {
    let relative_path = path
        .strip_prefix(&vault.root)
        .unwrap_or(path)
        .to_path_buf();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();
    let global_id = GlobalId::new(&vault.name, &name);

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            report.failures.push(LoadFailure {
                relative_path,
                reason: e.to_string(),
            });
            return;
        }
    };

    match parse_document(&content) {
        Ok(document) => {
            let status = classify_status(&document);
            report.workflows.push(LoadedWorkflow {
                global_id,
                relative_path,
                document,
                status,
            });
        }
        Err(e) => {
            report.failures.push(LoadFailure {
                relative_path,
                reason: e.to_string(),
            });
        }
    }
}

fn classify_status(document: &Document) -> WorkflowStatus {
    let frontmatter = match document.frontmatter() {
        Ok(fm) => fm,
        Err(e) => {
            return WorkflowStatus::Invalid {
                reason: e.to_string(),
            }
        }
    };
    if !frontmatter.enabled {
        return WorkflowStatus::Unscheduled {
            reason: "disabled in frontmatter".to_string(),
        };
    }
    if frontmatter.schedule.is_none() && document.sections.is_empty() {
        return WorkflowStatus::Unscheduled {
            reason: "no schedule and no steps".to_string(),
        };
    }
    WorkflowStatus::Valid
}

/// Rescan the whole vault (both Workflows and ContextTemplates) and replace
/// the prior report atomically from the caller's point of view: the new
/// report is built in full before the caller ever discards the old one.
pub fn rescan_vault(vault: &Vault) -> LoadReport {
    let mut report = scan_directory(vault, &vault.workflows_dir());
    let templates = scan_directory(vault, &vault.context_templates_dir());
    report.workflows.extend(templates.workflows);
    report.failures.extend(templates.failures);
    report
}

pub type Result<T> = std::result::Result<T, EngineError>;
