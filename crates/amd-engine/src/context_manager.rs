//! I. Context Manager (spec.md §4.I): assembles the system preamble and
//! history window a chat surface splices in ahead of a turn. Reuses
//! [`StepEngine::run_workflow`] for a context template's executable
//! sections rather than duplicating step execution — a `context`
//! destination writes into the router's context buffer exactly as it does
//! for an ordinary workflow, and `build_context` just drains it.

use amd_core::{GlobalId, Result, RunCause};
use amd_directive::{Document, PassthroughRuns};
use amd_gateway::estimate_tokens;

use crate::StepEngine;

/// One turn of chat history (SPEC_FULL.md §4.I).
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// `build_context`'s return value (spec.md §4.I).
#[derive(Debug, Clone)]
pub struct ContextResult {
    pub system_prompt: String,
    pub effective_history: Vec<ChatTurn>,
}

impl StepEngine {
    /// `build_context(template, session_id, chat_history, latest_user_message)`
    /// (spec.md §4.I).
    pub async fn build_context(
        &self,
        global_id: &GlobalId,
        document: &Document,
        session_id: Option<&str>,
        chat_history: &[ChatTurn],
        latest_user_message: &str,
    ) -> Result<ContextResult> {
        let frontmatter = document.frontmatter()?;
        let passthrough_runs = frontmatter.passthrough_runs.unwrap_or(PassthroughRuns::All);

        // Step 1: a template with only `Chat Instructions` and no
        // executable sections returns that preamble verbatim against the
        // full history, with zero sections run.
        if document.sections.is_empty() {
            let system_prompt = document.chat_instructions.clone().unwrap_or_default();
            return Ok(ContextResult {
                system_prompt,
                effective_history: append_latest(chat_history, latest_user_message, usize::MAX),
            });
        }

        // Step 2: token-threshold gating. Below threshold, skip every
        // executable section and return the passthrough window instead.
        let history_text: String = chat_history
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(threshold) = frontmatter.token_threshold {
            if estimate_tokens(&history_text) < threshold {
                let system_prompt = document.chat_instructions.clone().unwrap_or_default();
                return Ok(ContextResult {
                    system_prompt,
                    effective_history: passthrough_window(
                        chat_history,
                        latest_user_message,
                        passthrough_runs,
                    ),
                });
            }
        }

        // Step 3: run every executable section, letting `@cache` and
        // `@recent_runs`/`@recent_summaries` gate/shape each one exactly as
        // they do for a workflow step.
        self.run_workflow(global_id, document, RunCause::Manual, session_id)
            .await?;
        let routed_context = self.router().take_context();

        let system_prompt = compose_preamble(document.context_instructions.as_deref(), &routed_context);

        Ok(ContextResult {
            system_prompt,
            effective_history: passthrough_window(
                chat_history,
                latest_user_message,
                passthrough_runs,
            ),
        })
    }
}

fn compose_preamble(context_instructions: Option<&str>, routed_context: &str) -> String {
    let mut parts = Vec::new();
    if let Some(instructions) = context_instructions {
        if !instructions.is_empty() {
            parts.push(instructions.to_string());
        }
    }
    if !routed_context.is_empty() {
        parts.push(routed_context.to_string());
    }
    parts.join("\n\n")
}

/// The last `passthrough_runs` turns of `chat_history`, with
/// `latest_user_message` always appended verbatim (spec.md §4.I step 4).
fn passthrough_window(
    chat_history: &[ChatTurn],
    latest_user_message: &str,
    passthrough_runs: PassthroughRuns,
) -> Vec<ChatTurn> {
    let limit = match passthrough_runs {
        PassthroughRuns::Count(n) => n as usize,
        PassthroughRuns::All => usize::MAX,
    };
    append_latest(chat_history, latest_user_message, limit)
}

fn append_latest(chat_history: &[ChatTurn], latest_user_message: &str, limit: usize) -> Vec<ChatTurn> {
    let start = chat_history.len().saturating_sub(limit);
    let mut window: Vec<ChatTurn> = chat_history[start..].to_vec();
    window.push(ChatTurn {
        role: "user".to_string(),
        content: latest_user_message.to_string(),
    });
    window
}
