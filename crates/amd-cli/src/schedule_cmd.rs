//! `amdctl due`, `amdctl run-due`, and `amdctl reload` (spec.md §4.K, §4.L).

use std::sync::Arc;

use amd_core::RunRecord;
use amd_runtime::{ReloadResult, RuntimeContext};
use amd_scheduler::SchedulerJob;
use anyhow::Result;
use chrono::Utc;

pub fn handle_due(ctx: &RuntimeContext) -> Result<Vec<SchedulerJob>> {
    let (_, due) = ctx.reconcile_and_due(Utc::now())?;
    Ok(due)
}

pub async fn handle_run_due(ctx: &Arc<RuntimeContext>) -> Result<Vec<RunRecord>> {
    Ok(ctx.run_due_jobs(Utc::now()).await?)
}

pub fn print_run_due(records: &[RunRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("no jobs were due");
        return Ok(());
    }
    for record in records {
        println!(
            "{}: {}",
            record.global_id,
            if record.succeeded() { "ok" } else { "failed" }
        );
    }
    Ok(())
}

pub fn print_due(jobs: &[SchedulerJob], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(jobs)?);
        return Ok(());
    }
    if jobs.is_empty() {
        println!("no jobs due");
        return Ok(());
    }
    for job in jobs {
        println!("{} due at {} (trigger: {:?})", job.global_id, job.next_fire, job.trigger);
    }
    Ok(())
}

pub fn handle_reload(ctx: &RuntimeContext) -> Result<ReloadResult> {
    Ok(ctx.reload()?)
}

pub fn print_reload(result: &ReloadResult, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "last_config_reload": result.last_config_reload,
                "models_loaded": result.models_loaded,
                "tools_loaded": result.tools_loaded,
            })
        );
        return Ok(());
    }
    println!(
        "reloaded at {}: {} model alias(es), {} tool(s)",
        result.last_config_reload, result.models_loaded, result.tools_loaded
    );
    Ok(())
}
