//! Pending State store (spec.md §3 "Pending State"): a persisted record of
//! which vault files an `{pending}` input has already consumed, keyed by
//! `(global_id, pattern_string, path)` and a content digest so an edited
//! file is re-queued (spec.md §8 "Pending idempotence"). JSONL with
//! atomic-rewrite GC, the same shape as the teacher's
//! `csa-memory::store::MemoryStore`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use amd_core::{digest_file, EngineError, Result, Vault};
use amd_pattern::PendingLookup;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingEntry {
    global_id: String,
    pattern: String,
    path: String,
    digest: String,
}

const PENDING_FILE: &str = "pending.jsonl";

pub struct PendingStore {
    vault: Vault,
    file_path: PathBuf,
    entries: Mutex<Vec<PendingEntry>>,
}

impl PendingStore {
    pub fn load(system_root: &Path, vault: Vault) -> Result<Self> {
        let file_path = system_root.join(PENDING_FILE);
        let entries = if file_path.exists() {
            read_all(&file_path)?
        } else {
            Vec::new()
        };
        Ok(Self {
            vault,
            file_path,
            entries: Mutex::new(entries),
        })
    }

    /// Record `path` as processed for `(global_id, pattern)`. Called by the
    /// engine only after the step that consumed it succeeds.
    pub fn mark_processed(&self, global_id: &str, pattern: &str, path: &Path) -> Result<()> {
        let absolute = self.vault.resolve(&path.to_string_lossy())?;
        let digest = digest_file(&absolute)?;
        let entry = PendingEntry {
            global_id: global_id.to_string(),
            pattern: pattern.to_string(),
            path: path.to_string_lossy().to_string(),
            digest,
        };
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| !(e.global_id == entry.global_id && e.pattern == entry.pattern && e.path == entry.path));
        entries.push(entry.clone());
        append_line(&self.file_path, &entry)
    }

    /// Drop entries for `global_id` that no longer correspond to a file on
    /// disk, rewritten atomically (housekeeping, analogous to the teacher's
    /// `MemoryStore::rewrite_all`).
    pub fn compact(&self) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| self.vault.resolve(&e.path).map(|p| p.exists()).unwrap_or(false));
        rewrite_all(&self.file_path, &entries)
    }
}

impl PendingLookup for PendingStore {
    fn is_processed(&self, global_id: &str, pattern_string: &str, path: &Path) -> bool {
        let entries = self.entries.lock().unwrap();
        let path_str = path.to_string_lossy();
        let Some(entry) = entries
            .iter()
            .find(|e| e.global_id == global_id && e.pattern == pattern_string && e.path == path_str)
        else {
            return false;
        };
        let Ok(absolute) = self.vault.resolve(&path_str) else {
            return false;
        };
        match digest_file(&absolute) {
            Ok(current_digest) => current_digest == entry.digest,
            Err(_) => false,
        }
    }
}

fn read_all(path: &Path) -> Result<Vec<PendingEntry>> {
    let text = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PendingEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(line_number = idx + 1, %e, "skipping corrupt pending-state line");
            }
        }
    }
    Ok(entries)
}

fn append_line(path: &Path, entry: &PendingEntry) -> Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(entry).map_err(|e| EngineError::ConfigRepairNeeded(e.to_string()))?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

fn rewrite_all(path: &Path, entries: &[PendingEntry]) -> Result<()> {
    let mut buf = String::new();
    for entry in entries {
        let line = serde_json::to_string(entry).map_err(|e| EngineError::ConfigRepairNeeded(e.to_string()))?;
        buf.push_str(&line);
        buf.push('\n');
    }
    amd_core::atomic_file::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unmarked_path_is_not_processed() {
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        let store = PendingStore::load(tmp.path(), vault).unwrap();
        assert!(!store.is_processed("v/w", "inbox/{pending}", Path::new("inbox/a.md")));
    }

    #[test]
    fn marked_path_is_processed_until_content_changes() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("inbox")).unwrap();
        std::fs::write(tmp.path().join("inbox/a.md"), "v1").unwrap();
        let vault = Vault::new("v", tmp.path());
        let store = PendingStore::load(tmp.path(), vault).unwrap();
        store
            .mark_processed("v/w", "inbox/{pending}", Path::new("inbox/a.md"))
            .unwrap();
        assert!(store.is_processed("v/w", "inbox/{pending}", Path::new("inbox/a.md")));

        std::fs::write(tmp.path().join("inbox/a.md"), "v2 edited").unwrap();
        assert!(!store.is_processed("v/w", "inbox/{pending}", Path::new("inbox/a.md")));
    }

    #[test]
    fn persists_across_reload() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("inbox")).unwrap();
        std::fs::write(tmp.path().join("inbox/a.md"), "v1").unwrap();
        let vault = Vault::new("v", tmp.path());
        {
            let store = PendingStore::load(tmp.path(), vault.clone()).unwrap();
            store
                .mark_processed("v/w", "inbox/{pending}", Path::new("inbox/a.md"))
                .unwrap();
        }
        let reloaded = PendingStore::load(tmp.path(), vault).unwrap();
        assert!(reloaded.is_processed("v/w", "inbox/{pending}", Path::new("inbox/a.md")));
    }
}
