//! `amdctl rescan` (spec.md §4.J): scan every discovered vault (or one,
//! when named) and report what parsed and what didn't.

use amd_loader::LoadReport;
use amd_runtime::RuntimeContext;
use anyhow::{anyhow, Result};

pub fn handle_rescan(ctx: &RuntimeContext, vault: Option<String>) -> Result<Vec<(String, LoadReport)>> {
    let reports = ctx.rescan();
    let mut entries: Vec<(String, LoadReport)> = match vault {
        Some(name) => {
            let report = reports
                .get(&name)
                .cloned()
                .ok_or_else(|| anyhow!("no such vault '{name}' (known: {:?})", ctx.vault_names()))?;
            vec![(name, report)]
        }
        None => reports.into_iter().collect(),
    };
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

pub fn print_reports(entries: &[(String, LoadReport)], json: bool) -> Result<()> {
    if json {
        let summary: Vec<_> = entries
            .iter()
            .map(|(vault, report)| {
                serde_json::json!({
                    "vault": vault,
                    "workflows": report.workflows.iter().map(|w| w.global_id.to_string()).collect::<Vec<_>>(),
                    "failures": report.failures.iter().map(|f| format!("{}: {}", f.relative_path.display(), f.reason)).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    for (vault, report) in entries {
        println!("{vault}: {} loaded, {} failed", report.workflows.len(), report.failures.len());
        for workflow in &report.workflows {
            println!("  - {} [{:?}]", workflow.global_id, workflow.status);
        }
        for failure in &report.failures {
            println!("  ! {}: {}", failure.relative_path.display(), failure.reason);
        }
    }
    Ok(())
}
