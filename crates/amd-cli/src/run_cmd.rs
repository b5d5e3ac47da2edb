//! `amdctl run` (spec.md §4.H entry point from the command line).

use amd_core::{GlobalId, RunCause, RunRecord};
use amd_runtime::RuntimeContext;
use anyhow::Result;

pub async fn handle_run(
    ctx: &RuntimeContext,
    vault: &str,
    workflow: &str,
    session: Option<String>,
) -> Result<RunRecord> {
    let loaded = crate::lookup::find_workflow(ctx, vault, workflow)?;
    let engine = ctx.engine(vault)?;
    let global_id = GlobalId::new(vault, workflow);
    let record = engine
        .run_workflow(&global_id, &loaded.document, RunCause::Manual, session.as_deref())
        .await?;
    ctx.run_log().append(&record)?;
    Ok(record)
}

pub fn print_record(record: &RunRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }
    println!("run: {}", record.global_id);
    println!("  started:  {}", record.started_at);
    if let Some(finished) = record.finished_at {
        println!("  finished: {finished}");
    }
    for step in &record.step_log {
        println!("  - {}: {:?}", step.step_name, step.outcome);
    }
    if !record.output_files.is_empty() {
        println!("  output files: {:?}", record.output_files);
    }
    if !record.variables_created.is_empty() {
        println!("  variables: {:?}", record.variables_created);
    }
    if let Some(error) = &record.error {
        println!("  run error [{}]: {}", error.kind, error.message);
    }
    Ok(())
}
