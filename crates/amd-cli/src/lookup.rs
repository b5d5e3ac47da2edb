//! Shared "find this workflow/template by vault+name" helper used by every
//! subcommand that acts on a single definition.

use amd_core::GlobalId;
use amd_loader::LoadedWorkflow;
use amd_runtime::RuntimeContext;
use anyhow::{anyhow, Result};

pub fn find_workflow(ctx: &RuntimeContext, vault: &str, name: &str) -> Result<LoadedWorkflow> {
    let reports = ctx.rescan();
    let report = reports
        .get(vault)
        .ok_or_else(|| anyhow!("no such vault '{vault}' (known: {:?})", ctx.vault_names()))?;
    let global_id = GlobalId::new(vault, name);
    report.find(&global_id).cloned().ok_or_else(|| {
        anyhow!(
            "'{vault}/{name}' not found ({} parse failure(s) in this vault)",
            report.failures.len()
        )
    })
}
