//! D. Router (spec.md §4.D): resolves a step output's `Destination` into an
//! actual write — inline return, a named buffer, a vault file, the running
//! context, or discarded — and records a manifest entry for each.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use amd_buffer::BufferStore;
use amd_core::{Destination, Result, Scope, Vault, WriteMode};
use parking_lot::Mutex;

/// Manifest entries keep at most this many source labels; the rest are
/// still reflected in `count` (spec.md §4.D).
const MAX_SOURCE_LABELS: usize = 3;

/// One routed write, recorded for the run record / caller inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub step_heading: String,
    pub destination: DestinationSummary,
    pub bytes_written: usize,
    /// Number of source items (files, variables) that contributed to this
    /// write. At least 1 even when the caller didn't track individual
    /// sources (e.g. a tool result or a step's own assistant text).
    pub count: usize,
    /// Up to `MAX_SOURCE_LABELS` reference labels (file paths or variable
    /// names) identifying where the content came from.
    pub source_labels: Vec<String>,
}

impl ManifestEntry {
    fn new(
        step_heading: &str,
        destination: DestinationSummary,
        bytes_written: usize,
        source_labels: &[String],
    ) -> Self {
        Self {
            step_heading: step_heading.to_string(),
            destination,
            bytes_written,
            count: source_labels.len().max(1),
            source_labels: source_labels.iter().take(MAX_SOURCE_LABELS).cloned().collect(),
        }
    }

    /// Compact one-line summary of count, destination, byte length, and up
    /// to `MAX_SOURCE_LABELS` source labels (spec.md §4.D).
    pub fn render(&self) -> String {
        let mut line = format!(
            "{} -> {} ({} item(s), {} bytes)",
            self.step_heading,
            self.destination.describe(),
            self.count,
            self.bytes_written
        );
        if !self.source_labels.is_empty() {
            line.push_str(&format!(" [{}]", self.source_labels.join(", ")));
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationSummary {
    Inline,
    Variable { name: String, stored_as: String },
    File(PathBuf),
    Context,
    Discard,
}

impl DestinationSummary {
    fn describe(&self) -> String {
        match self {
            DestinationSummary::Inline => "inline".to_string(),
            DestinationSummary::Variable { stored_as, .. } => format!("variable:{stored_as}"),
            DestinationSummary::File(path) => format!("file:{}", path.display()),
            DestinationSummary::Context => "context".to_string(),
            DestinationSummary::Discard => "discard".to_string(),
        }
    }
}

/// Routes a step's output to its destination. Holds the vault (for `file:`
/// sandboxing) and a shared [`BufferStore`] (for `variable:` destinations).
/// A per-path lock table serializes concurrent writes to the same file —
/// steps in different runs can target the same vault file, and append/new
/// numbering must not race.
pub struct Router {
    vault: Vault,
    buffers: Arc<BufferStore>,
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    context_buffer: Mutex<String>,
}

impl Router {
    pub fn new(vault: Vault, buffers: Arc<BufferStore>) -> Self {
        Self {
            vault,
            buffers,
            file_locks: Mutex::new(HashMap::new()),
            context_buffer: Mutex::new(String::new()),
        }
    }

    fn lock_for(&self, path: &PathBuf) -> Arc<Mutex<()>> {
        self.file_locks
            .lock()
            .entry(path.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Route `content` to `destination`. `header`, when present, is
    /// prepended only for `file:` destinations (SPEC_FULL.md §4.D resolves
    /// this Open Question) — `variable:`/`context` receive the raw content.
    /// `source_labels` names the file paths / variable names that
    /// contributed `content`, for the returned manifest (empty when the
    /// caller has no individual sources to report, e.g. a step's own
    /// assistant text or a tool result).
    pub fn route(
        &self,
        step_heading: &str,
        destination: &Destination,
        content: &str,
        write_mode: WriteMode,
        session_id: Option<&str>,
        header: Option<&str>,
        source_labels: &[String],
    ) -> Result<ManifestEntry> {
        match destination {
            Destination::Inline => Ok(ManifestEntry::new(
                step_heading,
                DestinationSummary::Inline,
                content.len(),
                source_labels,
            )),
            Destination::Discard => Ok(ManifestEntry::new(
                step_heading,
                DestinationSummary::Discard,
                0,
                source_labels,
            )),
            Destination::Context => {
                let mut ctx = self.context_buffer.lock();
                if !ctx.is_empty() {
                    ctx.push('\n');
                }
                ctx.push_str(content);
                Ok(ManifestEntry::new(
                    step_heading,
                    DestinationSummary::Context,
                    content.len(),
                    source_labels,
                ))
            }
            Destination::Variable { name, scope } => {
                let scope = scope.unwrap_or(Scope::Run);
                let buffer_mode = match write_mode {
                    WriteMode::Append => amd_buffer::WriteMode::Append,
                    WriteMode::Replace => amd_buffer::WriteMode::Replace,
                    WriteMode::New => amd_buffer::WriteMode::New,
                };
                let stored_as = self.buffers.put(
                    scope,
                    session_id,
                    name,
                    content,
                    buffer_mode,
                    step_heading,
                )?;
                Ok(ManifestEntry::new(
                    step_heading,
                    DestinationSummary::Variable {
                        name: name.clone(),
                        stored_as,
                    },
                    content.len(),
                    source_labels,
                ))
            }
            Destination::File(relative) => {
                let path = self.vault.resolve(relative)?;
                let lock = self.lock_for(&path);
                let _guard = lock.lock();
                let payload = match header {
                    Some(h) if !h.is_empty() => format!("{h}\n{content}"),
                    _ => content.to_string(),
                };
                match write_mode {
                    WriteMode::Append => {
                        amd_core::atomic_file::append(&path, &payload, "\n---\n")?;
                    }
                    WriteMode::Replace => {
                        amd_core::atomic_file::write_atomic(&path, &payload)?;
                    }
                    WriteMode::New => {
                        let numbered = next_numbered_path(&path)?;
                        amd_core::atomic_file::write_atomic(&numbered, &payload)?;
                        return Ok(ManifestEntry::new(
                            step_heading,
                            DestinationSummary::File(numbered),
                            payload.len(),
                            source_labels,
                        ));
                    }
                }
                Ok(ManifestEntry::new(
                    step_heading,
                    DestinationSummary::File(path),
                    payload.len(),
                    source_labels,
                ))
            }
        }
    }

    /// Drain the accumulated `context` destination content for this run
    /// (consumed by the Context Manager when composing the next step).
    pub fn take_context(&self) -> String {
        std::mem::take(&mut *self.context_buffer.lock())
    }

    /// Read the accumulated `context` destination content without clearing
    /// it — used by the Context Manager to splice it into every subsequent
    /// step's system message as the run progresses.
    pub fn peek_context(&self) -> String {
        self.context_buffer.lock().clone()
    }
}

/// `new` write mode on a vault file: find the first unused
/// `stem_NNN.ext` sibling of `path`.
fn next_numbered_path(path: &PathBuf) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();
    let ext = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
    let mut n = 0usize;
    loop {
        let name = match ext {
            Some(ext) => format!("{stem}_{n:03}.{ext}"),
            None => format!("{stem}_{n:03}"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn router(tmp: &TempDir) -> Router {
        let vault = Vault::new("v", tmp.path());
        Router::new(vault, Arc::new(BufferStore::new()))
    }

    #[test]
    fn routes_inline_without_side_effects() {
        let tmp = TempDir::new().unwrap();
        let r = router(&tmp);
        let entry = r
            .route("Step", &Destination::Inline, "hello", WriteMode::Append, None, None, &[])
            .unwrap();
        assert_eq!(entry.destination, DestinationSummary::Inline);
    }

    #[test]
    fn routes_file_destination_and_applies_header() {
        let tmp = TempDir::new().unwrap();
        let r = router(&tmp);
        let dest = Destination::File("notes/a.md".into());
        r.route("Step", &dest, "body", WriteMode::Replace, None, Some("# Title"), &[])
            .unwrap();
        let written = std::fs::read_to_string(tmp.path().join("notes/a.md")).unwrap();
        assert_eq!(written, "# Title\nbody");
    }

    #[test]
    fn header_not_applied_to_variable_destination() {
        let tmp = TempDir::new().unwrap();
        let r = router(&tmp);
        let dest = Destination::Variable { name: "buf".into(), scope: None };
        r.route("Step", &dest, "body", WriteMode::Replace, None, Some("# Title"), &[])
            .unwrap();
        let buf = r.buffers.get(Scope::Run, None, "buf").unwrap();
        assert_eq!(buf.content, "body");
    }

    #[test]
    fn file_destination_rejects_escape() {
        let tmp = TempDir::new().unwrap();
        let r = router(&tmp);
        let dest = Destination::File("../escape.md".into());
        let err = r
            .route("Step", &dest, "x", WriteMode::Append, None, None, &[])
            .unwrap_err();
        assert!(matches!(err, amd_core::EngineError::VaultBoundary(_)));
    }

    #[test]
    fn new_mode_on_file_numbers_siblings() {
        let tmp = TempDir::new().unwrap();
        let r = router(&tmp);
        let dest = Destination::File("out.md".into());
        let e0 = r
            .route("Step", &dest, "a", WriteMode::New, None, None, &[])
            .unwrap();
        let e1 = r
            .route("Step", &dest, "b", WriteMode::New, None, None, &[])
            .unwrap();
        assert_ne!(e0.destination, e1.destination);
    }

    #[test]
    fn manifest_render_includes_count_destination_bytes_and_labels() {
        let tmp = TempDir::new().unwrap();
        let r = router(&tmp);
        let dest = Destination::File("notes/a.md".into());
        let labels = vec!["a.md".to_string(), "b.md".to_string()];
        let entry = r
            .route("Critique", &dest, "body", WriteMode::Replace, None, None, &labels)
            .unwrap();
        let rendered = entry.render();
        assert!(rendered.starts_with("Critique -> file:"));
        assert!(rendered.contains("2 item(s)"));
        assert!(rendered.contains("4 bytes"));
        assert!(rendered.contains("[a.md, b.md]"));
    }

    #[test]
    fn manifest_render_truncates_source_labels_to_the_cap_but_keeps_full_count() {
        let tmp = TempDir::new().unwrap();
        let r = router(&tmp);
        let labels: Vec<String> = (0..5).map(|i| format!("f{i}.md")).collect();
        let entry = r
            .route("Step", &Destination::Inline, "x", WriteMode::Append, None, None, &labels)
            .unwrap();
        assert_eq!(entry.count, 5);
        assert_eq!(entry.source_labels.len(), MAX_SOURCE_LABELS);
    }

    #[test]
    fn context_destination_accumulates_across_calls() {
        let tmp = TempDir::new().unwrap();
        let r = router(&tmp);
        r.route("Step1", &Destination::Context, "first", WriteMode::Append, None, None, &[])
            .unwrap();
        r.route("Step2", &Destination::Context, "second", WriteMode::Append, None, None, &[])
            .unwrap();
        assert_eq!(r.take_context(), "first\nsecond");
        assert_eq!(r.take_context(), "");
    }
}
