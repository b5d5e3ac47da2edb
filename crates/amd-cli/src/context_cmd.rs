//! `amdctl build-context` (spec.md §4.I Context Manager entry point): runs
//! a context template and prints the assembled system preamble and
//! effective history window a chat surface would use for its next turn.

use amd_core::GlobalId;
use amd_engine::context_manager::{ChatTurn, ContextResult};
use amd_runtime::RuntimeContext;
use anyhow::Result;

pub async fn handle_build_context(
    ctx: &RuntimeContext,
    vault: &str,
    template: &str,
    session: Option<String>,
    history: &[String],
    latest_user_message: &str,
) -> Result<ContextResult> {
    let loaded = crate::lookup::find_workflow(ctx, vault, template)?;
    let engine = ctx.engine(vault)?;
    let global_id = GlobalId::new(vault, template);
    let chat_history: Vec<ChatTurn> = history
        .iter()
        .map(|content| ChatTurn {
            role: "user".to_string(),
            content: content.clone(),
        })
        .collect();
    let result = engine
        .build_context(
            &global_id,
            &loaded.document,
            session.as_deref(),
            &chat_history,
            latest_user_message,
        )
        .await?;
    Ok(result)
}
