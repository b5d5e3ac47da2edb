//! `@cache` handling (spec.md §4.I Context Manager): skip re-invoking the
//! gateway for a step whose prior output is still valid under its declared
//! cache window.

use std::collections::HashMap;

use amd_directive::directives::CacheSpec;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct CacheEntry {
    text: String,
    /// The validity key this entry was stored under — a session id for
    /// `CacheSpec::Session`, a date for `Daily`, a week-start date for
    /// `Weekly`, or an absolute expiry timestamp for `DurationSeconds`.
    valid_until: Validity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Validity {
    Session(String),
    Date(NaiveDate),
    Instant(DateTime<Utc>),
}

/// In-memory, run-scoped cache keyed by `(global_id, step_heading,
/// template_digest, recent_runs_slice_digest, recent_summaries_slice_digest)`
/// (SPEC_FULL.md §4.I). Not persisted — spec.md doesn't require cache
/// survival across process restarts, only within a running scheduler/CLI
/// process. Folding the template digest into the key means an edited
/// template simply never hits a pre-edit entry again, which is what "cache
/// is invalidated on template edit" requires without needing explicit
/// eviction.
#[derive(Default)]
pub struct CacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

/// Empty-string digest used by callers that have no `@recent_runs`/
/// `@recent_summaries` slice to fold into the key (ordinary workflow steps).
pub const NO_RECENT_SLICE: &str = "";

fn key(
    global_id: &str,
    step_heading: &str,
    template_digest: &str,
    recent_runs_digest: &str,
    recent_summaries_digest: &str,
) -> String {
    format!(
        "{global_id}::{step_heading}::{template_digest}::{recent_runs_digest}::{recent_summaries_digest}"
    )
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached text for this step if it is still valid under
    /// `spec`, given the current moment and (for session-scoped caches) the
    /// active session id.
    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        global_id: &str,
        step_heading: &str,
        spec: &CacheSpec,
        now: DateTime<Utc>,
        today: NaiveDate,
        week_start: NaiveDate,
        session_id: Option<&str>,
        template_digest: &str,
        recent_runs_digest: &str,
        recent_summaries_digest: &str,
    ) -> Option<String> {
        let entries = self.entries.lock();
        let entry = entries.get(&key(
            global_id,
            step_heading,
            template_digest,
            recent_runs_digest,
            recent_summaries_digest,
        ))?;
        let valid = match (&entry.valid_until, spec) {
            (Validity::Session(sid), CacheSpec::Session) => Some(sid.as_str()) == session_id,
            (Validity::Date(d), CacheSpec::Daily) => *d == today,
            (Validity::Date(d), CacheSpec::Weekly) => *d == week_start,
            (Validity::Instant(t), CacheSpec::DurationSeconds(_)) => *t > now,
            _ => false,
        };
        if valid {
            Some(entry.text.clone())
        } else {
            None
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn put(
        &self,
        global_id: &str,
        step_heading: &str,
        spec: &CacheSpec,
        text: &str,
        now: DateTime<Utc>,
        today: NaiveDate,
        week_start: NaiveDate,
        session_id: Option<&str>,
        template_digest: &str,
        recent_runs_digest: &str,
        recent_summaries_digest: &str,
    ) {
        let valid_until = match spec {
            CacheSpec::Session => Validity::Session(session_id.unwrap_or("").to_string()),
            CacheSpec::Daily => Validity::Date(today),
            CacheSpec::Weekly => Validity::Date(week_start),
            CacheSpec::DurationSeconds(secs) => {
                Validity::Instant(now + chrono::Duration::seconds(*secs as i64))
            }
        };
        self.entries.lock().insert(
            key(
                global_id,
                step_heading,
                template_digest,
                recent_runs_digest,
                recent_summaries_digest,
            ),
            CacheEntry {
                text: text.to_string(),
                valid_until,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
    }

    #[test]
    fn daily_cache_hits_same_day() {
        let store = CacheStore::new();
        let now = Utc::now();
        store.put("v/w", "Step", &CacheSpec::Daily, "result", now, today(), today(), None, "d1", "", "");
        let hit = store.get("v/w", "Step", &CacheSpec::Daily, now, today(), today(), None, "d1", "", "");
        assert_eq!(hit, Some("result".to_string()));
    }

    #[test]
    fn daily_cache_misses_next_day() {
        let store = CacheStore::new();
        let now = Utc::now();
        store.put("v/w", "Step", &CacheSpec::Daily, "result", now, today(), today(), None, "d1", "", "");
        let tomorrow = today().succ_opt().unwrap();
        let hit = store.get("v/w", "Step", &CacheSpec::Daily, now, tomorrow, tomorrow, None, "d1", "", "");
        assert_eq!(hit, None);
    }

    #[test]
    fn duration_cache_expires() {
        let store = CacheStore::new();
        let now = Utc::now();
        store.put(
            "v/w",
            "Step",
            &CacheSpec::DurationSeconds(60),
            "result",
            now,
            today(),
            today(),
            None,
            "d1",
            "",
            "",
        );
        let later = now + chrono::Duration::seconds(61);
        let hit = store.get(
            "v/w",
            "Step",
            &CacheSpec::DurationSeconds(60),
            later,
            today(),
            today(),
            None,
            "d1",
            "",
            "",
        );
        assert_eq!(hit, None);
    }

    #[test]
    fn session_cache_requires_matching_session() {
        let store = CacheStore::new();
        let now = Utc::now();
        store.put(
            "v/w",
            "Step",
            &CacheSpec::Session,
            "result",
            now,
            today(),
            today(),
            Some("sess-1"),
            "d1",
            "",
            "",
        );
        assert_eq!(
            store.get(
                "v/w", "Step", &CacheSpec::Session, now, today(), today(), Some("sess-1"), "d1", "", ""
            ),
            Some("result".to_string())
        );
        assert_eq!(
            store.get(
                "v/w", "Step", &CacheSpec::Session, now, today(), today(), Some("sess-2"), "d1", "", ""
            ),
            None
        );
    }

    #[test]
    fn editing_the_template_invalidates_the_cache() {
        let store = CacheStore::new();
        let now = Utc::now();
        store.put("v/w", "Step", &CacheSpec::Daily, "result", now, today(), today(), None, "d1", "", "");
        let hit = store.get("v/w", "Step", &CacheSpec::Daily, now, today(), today(), None, "d2", "", "");
        assert_eq!(hit, None);
    }
}
