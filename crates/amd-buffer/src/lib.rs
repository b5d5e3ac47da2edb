//! C. Buffer Store (spec.md §4.C): named in-memory payloads scoped to a run
//! or a chat session, with append/replace/new write semantics.

use std::collections::HashMap;

use amd_core::{EngineError, Result, Scope, WriteMode};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct Buffer {
    pub name: String,
    pub scope: Scope,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct BufferInfo {
    pub name: String,
    pub scope: Scope,
    pub byte_len: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const APPEND_SEPARATOR: &str = "\n";

#[derive(Default)]
struct Bucket {
    buffers: HashMap<String, Buffer>,
    new_counters: HashMap<String, usize>,
}

impl Bucket {
    fn put(&mut self, scope: Scope, name: &str, content: &str, mode: WriteMode, source: &str, now: DateTime<Utc>) -> String {
        match mode {
            WriteMode::Replace => {
                self.buffers.insert(
                    name.to_string(),
                    Buffer {
                        name: name.to_string(),
                        scope,
                        content: content.to_string(),
                        created_at: now,
                        updated_at: now,
                        source: source.to_string(),
                    },
                );
                name.to_string()
            }
            WriteMode::Append => {
                self.buffers
                    .entry(name.to_string())
                    .and_modify(|b| {
                        b.content.push_str(APPEND_SEPARATOR);
                        b.content.push_str(content);
                        b.updated_at = now;
                    })
                    .or_insert_with(|| Buffer {
                        name: name.to_string(),
                        scope,
                        content: content.to_string(),
                        created_at: now,
                        updated_at: now,
                        source: source.to_string(),
                    });
                name.to_string()
            }
            WriteMode::New => {
                let counter = self.new_counters.entry(name.to_string()).or_insert(0);
                let stored_name = format!("{name}_{counter:03}");
                *counter += 1;
                self.buffers.insert(
                    stored_name.clone(),
                    Buffer {
                        name: stored_name.clone(),
                        scope,
                        content: content.to_string(),
                        created_at: now,
                        updated_at: now,
                        source: source.to_string(),
                    },
                );
                stored_name
            }
        }
    }
}

/// Buffer Store: one instance is shared by every step within a single
/// engine invocation (run scope) and by every chat turn within a session
/// (session scope). Run buffers are cleared by [`BufferStore::clear_run`]
/// at the start of each new invocation; session buffers persist until the
/// session is cleared.
pub struct BufferStore {
    run: Mutex<Bucket>,
    sessions: Mutex<HashMap<String, Bucket>>,
}

impl Default for BufferStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferStore {
    pub fn new() -> Self {
        Self {
            run: Mutex::new(Bucket::default()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Write `content` to `(scope, name)`. Returns the actually-stored
    /// buffer name (differs from `name` only under [`WriteMode::New`]).
    pub fn put(
        &self,
        scope: Scope,
        session_id: Option<&str>,
        name: &str,
        content: &str,
        mode: WriteMode,
        source: &str,
    ) -> Result<String> {
        let now = Utc::now();
        match scope {
            Scope::Run => Ok(self.run.lock().put(scope, name, content, mode, source, now)),
            Scope::Session => {
                let session_id = session_id.ok_or_else(|| {
                    EngineError::BufferLimitExceeded(
                        "session scope requires a session_id".to_string(),
                    )
                })?;
                let mut sessions = self.sessions.lock();
                let bucket = sessions.entry(session_id.to_string()).or_default();
                Ok(bucket.put(scope, name, content, mode, source, now))
            }
        }
    }

    pub fn get(&self, scope: Scope, session_id: Option<&str>, name: &str) -> Option<Buffer> {
        match scope {
            Scope::Run => self.run.lock().buffers.get(name).cloned(),
            Scope::Session => {
                let sessions = self.sessions.lock();
                sessions
                    .get(session_id?)
                    .and_then(|b| b.buffers.get(name))
                    .cloned()
            }
        }
    }

    pub fn list(&self, scope: Scope, session_id: Option<&str>) -> Vec<String> {
        match scope {
            Scope::Run => {
                let mut names: Vec<String> = self.run.lock().buffers.keys().cloned().collect();
                names.sort();
                names
            }
            Scope::Session => {
                let sessions = self.sessions.lock();
                let mut names: Vec<String> = session_id
                    .and_then(|id| sessions.get(id))
                    .map(|b| b.buffers.keys().cloned().collect())
                    .unwrap_or_default();
                names.sort();
                names
            }
        }
    }

    pub fn info(&self, scope: Scope, session_id: Option<&str>, name: &str) -> Option<BufferInfo> {
        self.get(scope, session_id, name).map(|b| BufferInfo {
            name: b.name,
            scope: b.scope,
            byte_len: b.content.len(),
            created_at: b.created_at,
            updated_at: b.updated_at,
        })
    }

    /// Return matching lines (1-based line number, text) for `pattern`
    /// (a literal substring or regex) within the named buffer.
    pub fn search(
        &self,
        scope: Scope,
        session_id: Option<&str>,
        name: &str,
        pattern: &str,
    ) -> Result<Vec<(usize, String)>> {
        let Some(buffer) = self.get(scope, session_id, name) else {
            return Ok(Vec::new());
        };
        let re = regex::Regex::new(pattern)
            .map_err(|e| EngineError::InvalidPattern(format!("bad search pattern: {e}")))?;
        Ok(buffer
            .content
            .lines()
            .enumerate()
            .filter(|(_, line)| re.is_match(line))
            .map(|(i, line)| (i + 1, line.to_string()))
            .collect())
    }

    /// Remove every run-scoped buffer. Called at the start of each engine
    /// invocation (spec.md §4.H step 1: "fresh run-scoped buffer view").
    pub fn clear_run(&self) {
        *self.run.lock() = Bucket::default();
    }

    pub fn clear_session(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_inserts_separator_and_preserves_previous_content() {
        let store = BufferStore::new();
        store
            .put(Scope::Run, None, "foo", "first", WriteMode::Append, "a")
            .unwrap();
        store
            .put(Scope::Run, None, "foo", "second", WriteMode::Append, "b")
            .unwrap();
        let buf = store.get(Scope::Run, None, "foo").unwrap();
        assert_eq!(buf.content, "first\nsecond");
    }

    #[test]
    fn replace_discards_previous_content() {
        let store = BufferStore::new();
        store
            .put(Scope::Run, None, "foo", "first", WriteMode::Append, "a")
            .unwrap();
        store
            .put(Scope::Run, None, "foo", "second", WriteMode::Replace, "b")
            .unwrap();
        let buf = store.get(Scope::Run, None, "foo").unwrap();
        assert_eq!(buf.content, "second");
    }

    #[test]
    fn new_mode_numbers_buffers_without_collision() {
        let store = BufferStore::new();
        let n0 = store
            .put(Scope::Run, None, "foo", "a", WriteMode::New, "s")
            .unwrap();
        let n1 = store
            .put(Scope::Run, None, "foo", "b", WriteMode::New, "s")
            .unwrap();
        assert_eq!(n0, "foo_000");
        assert_eq!(n1, "foo_001");
        assert_ne!(n0, n1);
    }

    #[test]
    fn run_and_session_scopes_with_same_name_coexist() {
        let store = BufferStore::new();
        store
            .put(Scope::Run, None, "shared", "run-value", WriteMode::Replace, "s")
            .unwrap();
        store
            .put(
                Scope::Session,
                Some("sess-1"),
                "shared",
                "session-value",
                WriteMode::Replace,
                "s",
            )
            .unwrap();
        assert_eq!(
            store.get(Scope::Run, None, "shared").unwrap().content,
            "run-value"
        );
        assert_eq!(
            store.get(Scope::Session, Some("sess-1"), "shared").unwrap().content,
            "session-value"
        );
    }

    #[test]
    fn session_scope_without_session_id_errors() {
        let store = BufferStore::new();
        let err = store
            .put(Scope::Session, None, "foo", "x", WriteMode::Replace, "s")
            .unwrap_err();
        assert!(matches!(err, EngineError::BufferLimitExceeded(_)));
    }

    #[test]
    fn clear_run_empties_run_scope_but_not_sessions() {
        let store = BufferStore::new();
        store
            .put(Scope::Run, None, "foo", "x", WriteMode::Replace, "s")
            .unwrap();
        store
            .put(Scope::Session, Some("sess"), "bar", "y", WriteMode::Replace, "s")
            .unwrap();
        store.clear_run();
        assert!(store.get(Scope::Run, None, "foo").is_none());
        assert!(store.get(Scope::Session, Some("sess"), "bar").is_some());
    }

    #[test]
    fn search_returns_matching_lines_with_line_numbers() {
        let store = BufferStore::new();
        store
            .put(
                Scope::Run,
                None,
                "log",
                "alpha\nbeta\nalpha again",
                WriteMode::Replace,
                "s",
            )
            .unwrap();
        let matches = store.search(Scope::Run, None, "log", "alpha").unwrap();
        assert_eq!(matches, vec![(1, "alpha".to_string()), (3, "alpha again".to_string())]);
    }
}
