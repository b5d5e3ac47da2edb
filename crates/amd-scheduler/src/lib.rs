//! K. Scheduler (spec.md §4.K): reconciles the loaded workflow set against a
//! persisted job store, computes due jobs for the runtime's tick loop, and
//! never re-derives `next_fire` for a job whose trigger text didn't change
//! (spec.md §8 "Scheduler stability").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use amd_core::{EngineError, GlobalId, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Trigger {
    Cron(String),
    Once(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerJob {
    pub global_id: String,
    pub trigger: Trigger,
    pub next_fire: DateTime<Utc>,
    pub enabled: bool,
}

/// Persisted job store: a single JSON file written with the same
/// temp-then-rename discipline the Router and Buffer Store use (SPEC_FULL.md
/// §4.K).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct JobStore {
    pub jobs: HashMap<String, SchedulerJob>,
}

impl JobStore {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            EngineError::ScheduleParseError(format!("corrupt job store {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::ScheduleParseError(e.to_string()))?;
        amd_core::atomic_file::write_atomic(path, &text)
    }
}

/// Compute the next fire time for `trigger` strictly after `after`, in
/// `tz`. `Once` triggers fire exactly at their timestamp and never again.
pub fn next_fire_after(trigger: &Trigger, after: DateTime<Utc>, tz: Tz) -> Result<Option<DateTime<Utc>>> {
    match trigger {
        Trigger::Once(at) => Ok(if *at > after { Some(*at) } else { None }),
        Trigger::Cron(expr) => {
            // `amd-directive` validates the frontmatter `cron:` value as a
            // standard 5-field unix expression; the `cron` crate requires a
            // leading seconds field, so a bare 5-field string gets `0 `
            // prepended here.
            let normalized = if expr.split_whitespace().count() == 5 {
                format!("0 {expr}")
            } else {
                expr.clone()
            };
            let schedule: cron::Schedule = normalized
                .parse()
                .map_err(|e| EngineError::ScheduleParseError(format!("invalid cron '{expr}': {e}")))?;
            let after_tz = after.with_timezone(&tz);
            Ok(schedule
                .after(&after_tz)
                .next()
                .map(|dt| dt.with_timezone(&Utc)))
        }
    }
}

/// A workflow's declared trigger, as seen by reconciliation — `None` means
/// the workflow has no `schedule:` and should have no scheduler job.
pub struct DeclaredTrigger {
    pub global_id: GlobalId,
    pub trigger: Option<Trigger>,
    pub enabled: bool,
}

/// Reconcile the persisted job store against the currently loaded workflow
/// set (spec.md §4.K reconciliation table):
/// - new workflow with a trigger → create, computing `next_fire` fresh.
/// - existing job whose trigger text is unchanged → preserve `next_fire`
///   (don't re-derive it, so an in-flight job isn't silently rescheduled).
/// - existing job whose trigger text changed → replace, recomputing
///   `next_fire`.
/// - workflow no longer declares a trigger → remove its job.
/// - a workflow currently running is protected from removal by the caller
///   (the scheduler itself has no notion of "currently running"; the
///   runtime excludes in-flight `global_id`s from `declared` before calling
///   this function).
pub fn reconcile(
    mut store: JobStore,
    declared: &[DeclaredTrigger],
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<JobStore> {
    let declared_ids: std::collections::HashSet<&str> =
        declared.iter().map(|d| d.global_id.0.as_str()).collect();
    store.jobs.retain(|id, _| declared_ids.contains(id.as_str()));

    for d in declared {
        let Some(trigger) = &d.trigger else {
            store.jobs.remove(&d.global_id.0);
            continue;
        };
        match store.jobs.get_mut(&d.global_id.0) {
            Some(existing) if &existing.trigger == trigger => {
                existing.enabled = d.enabled;
            }
            _ => {
                let next_fire = match next_fire_after(trigger, now, tz)? {
                    Some(nf) => nf,
                    None => continue, // a `once:` trigger already in the past
                };
                store.jobs.insert(
                    d.global_id.0.clone(),
                    SchedulerJob {
                        global_id: d.global_id.0.clone(),
                        trigger: trigger.clone(),
                        next_fire,
                        enabled: d.enabled,
                    },
                );
            }
        }
    }
    Ok(store)
}

/// Jobs whose `next_fire` is at or before `now` and are enabled.
pub fn due_jobs(store: &JobStore, now: DateTime<Utc>) -> Vec<SchedulerJob> {
    store
        .jobs
        .values()
        .filter(|j| j.enabled && j.next_fire <= now)
        .cloned()
        .collect()
}

/// After firing a job, advance it to its next occurrence (cron jobs) or
/// remove it (one-shot `once:` jobs that have now fired).
pub fn advance_after_fire(store: &mut JobStore, global_id: &str, now: DateTime<Utc>, tz: Tz) -> Result<()> {
    let Some(job) = store.jobs.get(global_id).cloned() else {
        return Ok(());
    };
    match &job.trigger {
        Trigger::Once(_) => {
            store.jobs.remove(global_id);
        }
        Trigger::Cron(_) => {
            if let Some(next) = next_fire_after(&job.trigger, now, tz)? {
                store.jobs.get_mut(global_id).unwrap().next_fire = next;
            } else {
                store.jobs.remove(global_id);
            }
        }
    }
    Ok(())
}

pub fn default_job_store_path(system_root: &Path) -> PathBuf {
    system_root.join("scheduler").join("jobs.json")
}
