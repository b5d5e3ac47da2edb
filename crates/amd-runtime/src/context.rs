//! [`RuntimeContext`] itself: vault discovery, per-vault Step Engine
//! construction, schedule reconciliation, and config reload (spec.md §4.L).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use amd_buffer::BufferStore;
use amd_config::{PendingStore, RunLog, Secrets, Settings};
use amd_core::{EngineError, GlobalId, Result, RunCause, RunRecord, Vault};
use amd_engine::StepEngine;
use amd_gateway::{EchoProvider, Gateway, Provider};
use amd_loader::{rescan_vault, LoadReport};
use amd_router::Router;
use amd_scheduler::{
    advance_after_fire, due_jobs, reconcile, DeclaredTrigger, JobStore, SchedulerJob, Trigger,
};
use amd_tools::{default_registry, ToolRegistry};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

/// Bootstrap parameters (spec.md §4.L). `data_root` holds one or more vault
/// directories (each a direct child directory, minus any carrying a
/// `.vaultignore` marker); `system_root` holds `settings.yaml`,
/// `secrets.yaml`, and engine state (pending state, run log, job store).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_root: PathBuf,
    pub system_root: PathBuf,
    pub scheduler_worker_limit: u32,
    pub features: HashMap<String, bool>,
}

impl RuntimeConfig {
    pub fn new(data_root: impl Into<PathBuf>, system_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            system_root: system_root.into(),
            scheduler_worker_limit: 4,
            features: HashMap::new(),
        }
    }
}

/// Result of a [`RuntimeContext::reload`] call.
#[derive(Debug, Clone)]
pub struct ReloadResult {
    pub last_config_reload: DateTime<Utc>,
    pub models_loaded: usize,
    pub tools_loaded: usize,
}

/// Process-wide singleton created during bootstrap (spec.md §4.L).
/// Ownership: this is the owner of the Loader's inputs, the Scheduler's job
/// store path, and the single process-wide Buffer Store — matching spec.md
/// §3's "Runtime Context owns the Loader, Scheduler, and Buffer Store."
pub struct RuntimeContext {
    config: RuntimeConfig,
    vaults: HashMap<String, Vault>,
    buffers: Arc<BufferStore>,
    settings: Mutex<Settings>,
    secrets: Mutex<Secrets>,
    tools: ToolRegistry,
    run_log: Arc<RunLog>,
    pending: HashMap<String, Arc<PendingStore>>,
    engines: HashMap<String, StepEngine>,
    job_store_path: PathBuf,
    last_config_reload: Mutex<Option<DateTime<Utc>>>,
    in_flight: Mutex<HashSet<String>>,
}

impl RuntimeContext {
    /// Build the context from scratch: seed/load settings and secrets,
    /// discover vaults under `config.data_root`, and construct one Step
    /// Engine per vault sharing the process-wide Buffer Store, Gateway, and
    /// Tool Registry.
    pub fn bootstrap(config: RuntimeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_root)?;
        std::fs::create_dir_all(&config.system_root)?;

        let settings = Settings::load_or_seed(&config.system_root)?;
        let secrets = Secrets::load_or_seed(&config.system_root)?;

        let vaults = discover_vaults(&config.data_root);
        let buffers = Arc::new(BufferStore::new());
        let tools = default_registry();
        let gateway = build_gateway(&settings);
        let run_log = Arc::new(RunLog::new(&config.system_root));
        let job_store_path = amd_scheduler::default_job_store_path(&config.system_root);

        let mut pending = HashMap::new();
        let mut engines = HashMap::new();
        for (name, vault) in &vaults {
            let pending_store = Arc::new(PendingStore::load(&config.system_root, vault.clone())?);
            let router = Router::new(vault.clone(), buffers.clone());
            let engine = StepEngine::new(
                vault.clone(),
                buffers.clone(),
                router,
                gateway.clone(),
                tools.clone(),
                Some(pending_store.clone()),
                run_log.clone(),
            );
            pending.insert(name.clone(), pending_store);
            engines.insert(name.clone(), engine);
        }

        tracing::info!(
            vault_count = vaults.len(),
            data_root = %config.data_root.display(),
            system_root = %config.system_root.display(),
            "runtime context bootstrapped"
        );

        Ok(Self {
            config,
            vaults,
            buffers,
            settings: Mutex::new(settings),
            secrets: Mutex::new(secrets),
            tools,
            run_log,
            pending,
            engines,
            job_store_path,
            last_config_reload: Mutex::new(None),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    pub fn data_root(&self) -> &Path {
        &self.config.data_root
    }

    pub fn system_root(&self) -> &Path {
        &self.config.system_root
    }

    pub fn vault(&self, name: &str) -> Option<&Vault> {
        self.vaults.get(name)
    }

    pub fn vault_names(&self) -> Vec<&str> {
        self.vaults.keys().map(|s| s.as_str()).collect()
    }

    /// The Step Engine bootstrapped for `vault_name`, or `RuntimeStateError`
    /// if no such vault was discovered at bootstrap time.
    pub fn engine(&self, vault_name: &str) -> Result<&StepEngine> {
        self.engines
            .get(vault_name)
            .ok_or(EngineError::RuntimeStateError)
    }

    pub fn pending_store(&self, vault_name: &str) -> Option<&Arc<PendingStore>> {
        self.pending.get(vault_name)
    }

    pub fn buffers(&self) -> &Arc<BufferStore> {
        &self.buffers
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn run_log(&self) -> &Arc<RunLog> {
        &self.run_log
    }

    /// Scan every discovered vault's `Workflows`/`ContextTemplates`
    /// directories (spec.md §4.J), one report per vault. A fresh scan each
    /// call; nothing held by the caller is mutated in place.
    pub fn rescan(&self) -> HashMap<String, LoadReport> {
        self.vaults
            .iter()
            .map(|(name, vault)| (name.clone(), rescan_vault(vault)))
            .collect()
    }

    /// Reconcile the persisted job store against every vault's currently
    /// loaded schedules, persist the reconciled store, and return the jobs
    /// due at `now` (spec.md §4.K).
    pub fn reconcile_and_due(&self, now: DateTime<Utc>) -> Result<(JobStore, Vec<SchedulerJob>)> {
        let reports = self.rescan();
        let tz = self.timezone();
        let mut declared = Vec::new();
        for report in reports.values() {
            for workflow in &report.workflows {
                if let Ok(frontmatter) = workflow.document.frontmatter() {
                    let trigger = match &frontmatter.schedule {
                        Some(spec) => Some(schedule_to_trigger(spec, tz)?),
                        None => None,
                    };
                    declared.push(DeclaredTrigger {
                        global_id: workflow.global_id.clone(),
                        trigger,
                        enabled: frontmatter.enabled,
                    });
                }
            }
        }
        let store = JobStore::load(&self.job_store_path)?;
        let reconciled = reconcile(store, &declared, now, tz)?;
        reconciled.save(&self.job_store_path)?;
        let due = due_jobs(&reconciled, now);
        Ok((reconciled, due))
    }

    pub fn job_store_path(&self) -> &Path {
        &self.job_store_path
    }

    /// Fire every job due at `now` on a bounded worker pool sized to
    /// `scheduler_worker_limit` (spec.md §5): one worker per concurrent run,
    /// different workflows run in parallel up to the limit, and a job whose
    /// `global_id` is already mid-run is skipped rather than double-fired —
    /// the scheduler's "no two concurrent runs of the same `global_id`"
    /// guarantee. Requires `Arc<Self>` since each run executes on its own
    /// `tokio` task.
    pub async fn run_due_jobs(self: &Arc<Self>, now: DateTime<Utc>) -> Result<Vec<RunRecord>> {
        let (mut store, due) = self.reconcile_and_due(now)?;
        let tz = self.timezone();
        let limit = self.config.scheduler_worker_limit.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(limit));
        let reports = self.rescan();

        let mut handles = Vec::new();
        for job in due {
            let global_id = GlobalId(job.global_id.clone());
            {
                let mut in_flight = self.in_flight.lock();
                if in_flight.contains(&job.global_id) {
                    tracing::warn!(global_id = %job.global_id, "skipping: already running");
                    continue;
                }
                in_flight.insert(job.global_id.clone());
            }
            let Some(loaded) = reports
                .get(global_id.vault())
                .and_then(|report| report.find(&global_id))
                .cloned()
            else {
                self.in_flight.lock().remove(&job.global_id);
                tracing::warn!(global_id = %job.global_id, "due job no longer resolves to a loaded workflow");
                continue;
            };

            let ctx = Arc::clone(self);
            let permit_sem = Arc::clone(&semaphore);
            let vault_name = global_id.vault().to_string();
            handles.push(tokio::spawn(async move {
                let _permit = permit_sem
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                let result = match ctx.engine(&vault_name) {
                    Ok(engine) => {
                        engine
                            .run_workflow(&global_id, &loaded.document, RunCause::Scheduled, None)
                            .await
                    }
                    Err(e) => Err(e),
                };
                ctx.in_flight.lock().remove(&global_id.0);
                result
            }));
        }

        let mut records = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(record)) => {
                    self.run_log.append(&record)?;
                    advance_after_fire(&mut store, &record.global_id, now, tz)?;
                    records.push(record);
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "scheduled run failed"),
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "scheduled run task did not complete")
                }
            }
        }
        store.save(&self.job_store_path)?;
        Ok(records)
    }

    fn timezone(&self) -> Tz {
        self.settings
            .lock()
            .settings
            .timezone
            .parse()
            .unwrap_or(Tz::UTC)
    }

    /// Refresh settings/secrets from disk, timestamp the reload, and report
    /// a summary of what's now loaded (spec.md §4.L).
    pub fn reload(&self) -> Result<ReloadResult> {
        let settings = Settings::load_or_seed(&self.config.system_root)?;
        let secrets = Secrets::load_or_seed(&self.config.system_root)?;
        let models_loaded = settings.models.len();
        let tools_loaded = self.tools.len();
        *self.settings.lock() = settings;
        *self.secrets.lock() = secrets;
        let now = Utc::now();
        *self.last_config_reload.lock() = Some(now);
        tracing::info!(models_loaded, tools_loaded, "runtime config reloaded");
        Ok(ReloadResult {
            last_config_reload: now,
            models_loaded,
            tools_loaded,
        })
    }

    pub fn last_config_reload(&self) -> Option<DateTime<Utc>> {
        *self.last_config_reload.lock()
    }
}

fn discover_vaults(data_root: &Path) -> HashMap<String, Vault> {
    let mut vaults = HashMap::new();
    let Ok(entries) = std::fs::read_dir(data_root) else {
        return vaults;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(|s| s.to_string()) else {
            continue;
        };
        let vault = Vault::new(name.clone(), path);
        if vault.is_ignored() {
            continue;
        }
        vaults.insert(name, vault);
    }
    vaults
}

/// Concrete provider SDKs are out of scope (spec.md §1); every provider
/// named in `settings.models` resolves to the deterministic echo provider
/// so alias resolution, routing, and caching are exercised end-to-end
/// without a network dependency.
fn build_gateway(settings: &Settings) -> Gateway {
    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    for model in settings.models.values() {
        providers
            .entry(model.provider.clone())
            .or_insert_with(|| Arc::new(EchoProvider));
    }
    providers
        .entry("echo".to_string())
        .or_insert_with(|| Arc::new(EchoProvider));
    Gateway::new(settings.models.clone(), providers)
}

fn schedule_to_trigger(spec: &amd_directive::ScheduleSpec, tz: Tz) -> Result<Trigger> {
    use amd_directive::ScheduleSpec;
    match spec {
        ScheduleSpec::Cron(expr) => Ok(Trigger::Cron(expr.clone())),
        ScheduleSpec::Once(raw) => {
            let naive = parse_once_datetime(raw)?;
            let local = tz.from_local_datetime(&naive).single().ok_or_else(|| {
                EngineError::ScheduleParseError(format!("ambiguous local time '{raw}'"))
            })?;
            Ok(Trigger::Once(local.with_timezone(&Utc)))
        }
    }
}

const ONCE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

fn parse_once_datetime(raw: &str) -> Result<NaiveDateTime> {
    for fmt in ONCE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(parsed);
        }
    }
    Err(EngineError::ScheduleParseError(format!(
        "unrecognized 'once:' datetime '{raw}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> RuntimeConfig {
        RuntimeConfig::new(tmp.path().join("data"), tmp.path().join("system"))
    }

    fn write_workflow(data_root: &Path, vault: &str, rel: &str, content: &str) {
        let path = data_root.join(vault).join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn bootstrap_seeds_settings_and_discovers_no_vaults_on_empty_data_root() {
        let tmp = TempDir::new().unwrap();
        let ctx = RuntimeContext::bootstrap(config(&tmp)).unwrap();
        assert!(ctx.vault_names().is_empty());
        assert!(tmp.path().join("system/settings.yaml").exists());
    }

    #[test]
    fn bootstrap_discovers_one_vault_per_data_root_subdirectory() {
        let tmp = TempDir::new().unwrap();
        write_workflow(
            &tmp.path().join("data"),
            "Personal",
            "AssistantMD/Workflows/daily.md",
            "---\nschedule: \"cron: 0 9 * * *\"\n---\n## Step\n@model gpt-mini\nhi\n",
        );
        let ctx = RuntimeContext::bootstrap(config(&tmp)).unwrap();
        assert_eq!(ctx.vault_names(), vec!["Personal"]);
        assert!(ctx.engine("Personal").is_ok());
    }

    #[test]
    fn vaultignore_marker_excludes_a_vault_from_discovery() {
        let tmp = TempDir::new().unwrap();
        let data_root = tmp.path().join("data");
        std::fs::create_dir_all(data_root.join("Excluded")).unwrap();
        std::fs::write(data_root.join("Excluded/.vaultignore"), "").unwrap();
        let ctx = RuntimeContext::bootstrap(config(&tmp)).unwrap();
        assert!(ctx.vault_names().is_empty());
    }

    #[tokio::test]
    async fn reconcile_and_due_surfaces_a_cron_job_as_not_yet_due() {
        let tmp = TempDir::new().unwrap();
        write_workflow(
            &tmp.path().join("data"),
            "Personal",
            "AssistantMD/Workflows/daily.md",
            "---\nschedule: \"cron: 0 9 * * *\"\n---\n## Step\n@model gpt-mini\nhi\n",
        );
        let ctx = RuntimeContext::bootstrap(config(&tmp)).unwrap();
        let now = Utc::now();
        let (store, _due) = ctx.reconcile_and_due(now).unwrap();
        assert_eq!(store.jobs.len(), 1);
        assert!(store.jobs.contains_key("Personal/daily"));
    }

    #[test]
    fn reload_timestamps_last_config_reload() {
        let tmp = TempDir::new().unwrap();
        let ctx = RuntimeContext::bootstrap(config(&tmp)).unwrap();
        assert!(ctx.last_config_reload().is_none());
        let result = ctx.reload().unwrap();
        assert!(ctx.last_config_reload().is_some());
        assert_eq!(result.tools_loaded, 3);
    }

    #[tokio::test]
    async fn run_due_jobs_fires_an_overdue_once_trigger_exactly_once() {
        let tmp = TempDir::new().unwrap();
        let t0 = Utc::now();
        let once_at = t0 + chrono::Duration::seconds(2);
        write_workflow(
            &tmp.path().join("data"),
            "Personal",
            "AssistantMD/Workflows/kickoff.md",
            &format!(
                "---\nschedule: \"once: {}\"\n---\n## Step\n@model gpt-mini\n@output variable:result\nhi\n",
                once_at.format("%Y-%m-%d %H:%M:%S")
            ),
        );
        let ctx = Arc::new(RuntimeContext::bootstrap(config(&tmp)).unwrap());

        // reconciling before the trigger's instant stores the job without
        // firing it yet.
        let (store, due_now) = ctx.reconcile_and_due(t0).unwrap();
        assert_eq!(store.jobs.len(), 1);
        assert!(due_now.is_empty());

        let later = once_at + chrono::Duration::seconds(1);
        let records = ctx.run_due_jobs(later).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].global_id, "Personal/kickoff");
        assert!(ctx.in_flight.lock().is_empty());

        // a `once:` trigger is removed by `advance_after_fire`, so a second
        // sweep after it already fired finds nothing left to run.
        let again = ctx.run_due_jobs(later).await.unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn once_trigger_parses_common_datetime_shape() {
        let trigger = schedule_to_trigger(
            &amd_directive::ScheduleSpec::Once("2030-01-01 09:00".to_string()),
            Tz::UTC,
        )
        .unwrap();
        assert!(matches!(trigger, Trigger::Once(_)));
    }
}
