use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

mod cli;
mod context_cmd;
mod lookup;
mod paths;
mod rescan_cmd;
mod run_cmd;
mod schedule_cmd;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let data_root = cli.data_root.clone().unwrap_or_else(paths::default_data_root);
    let system_root = cli.system_root.clone().unwrap_or_else(paths::default_system_root);
    let config = amd_runtime::RuntimeConfig::new(data_root, system_root);
    let ctx = Arc::new(amd_runtime::RuntimeContext::bootstrap(config)?);

    match cli.command {
        Commands::Run {
            vault,
            workflow,
            session,
        } => {
            let record = run_cmd::handle_run(&ctx, &vault, &workflow, session).await?;
            let failed = !record.succeeded();
            run_cmd::print_record(&record, cli.json)?;
            if failed {
                std::process::exit(1);
            }
        }
        Commands::Rescan { vault } => {
            let entries = rescan_cmd::handle_rescan(&ctx, vault)?;
            rescan_cmd::print_reports(&entries, cli.json)?;
        }
        Commands::BuildContext {
            vault,
            template,
            session,
            message,
            history,
        } => {
            let result = context_cmd::handle_build_context(
                &ctx, &vault, &template, session, &history, &message,
            )
            .await?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "system_prompt": result.system_prompt,
                        "effective_history": result
                            .effective_history
                            .iter()
                            .map(|t| serde_json::json!({ "role": t.role, "content": t.content }))
                            .collect::<Vec<_>>(),
                    })
                );
            } else {
                println!("--- system prompt ---\n{}", result.system_prompt);
                println!("--- effective history ({} turn(s)) ---", result.effective_history.len());
                for turn in &result.effective_history {
                    println!("[{}] {}", turn.role, turn.content);
                }
            }
        }
        Commands::Due => {
            let jobs = schedule_cmd::handle_due(&ctx)?;
            schedule_cmd::print_due(&jobs, cli.json)?;
        }
        Commands::RunDue => {
            let records = schedule_cmd::handle_run_due(&ctx).await?;
            schedule_cmd::print_run_due(&records, cli.json)?;
        }
        Commands::Reload => {
            let result = schedule_cmd::handle_reload(&ctx)?;
            schedule_cmd::print_reload(&result, cli.json)?;
        }
    }

    Ok(())
}
