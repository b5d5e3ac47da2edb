//! H. Step Engine + I. Context Manager (spec.md §4.H, §4.I): runs a
//! workflow's sections in order, gating on `@run_on`, resolving inputs,
//! composing the messages sent to the Gateway, routing the result, and
//! recording a [`RunRecord`].

pub mod cache;
pub mod context_manager;

use std::sync::Arc;

use amd_buffer::BufferStore;
use amd_config::{PendingStore, RunLog};
use amd_core::{
    DayMask, EngineEvent, GlobalId, Result, RunCause, RunRecord, Scope, StepLogEntry, StepOutcome,
    Vault, WeekDay,
};
use amd_directive::directives::{CacheSpec, ModelSpec, RecentSpec};
use amd_directive::{Document, Section};
use amd_gateway::{Gateway, ToolDescriptor};
use amd_input::{resolve_input, route_input_output};
use amd_pattern::{week_start_of, PatternContext};
use amd_router::Router;
use amd_tools::{ToolArgs, ToolRegistry};
use cache::CacheStore;
use chrono::{DateTime, Datelike, Utc};

pub struct StepEngine {
    vault: Vault,
    buffers: Arc<BufferStore>,
    router: Router,
    gateway: Gateway,
    tools: ToolRegistry,
    pending: Option<Arc<PendingStore>>,
    run_log: Arc<RunLog>,
    cache: CacheStore,
}

impl StepEngine {
    pub fn new(
        vault: Vault,
        buffers: Arc<BufferStore>,
        router: Router,
        gateway: Gateway,
        tools: ToolRegistry,
        pending: Option<Arc<PendingStore>>,
        run_log: Arc<RunLog>,
    ) -> Self {
        Self {
            vault,
            buffers,
            router,
            gateway,
            tools,
            pending,
            run_log,
            cache: CacheStore::new(),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Execute every section of `document` in order and return the
    /// completed [`RunRecord`]. A single step's failure is recorded and the
    /// run continues to the next step (spec.md §7: step failures don't
    /// abort a run unless the engine itself can't proceed, e.g. a
    /// frontmatter parse error, which is caught before this is called).
    pub async fn run_workflow(
        &self,
        global_id: &GlobalId,
        document: &Document,
        cause: RunCause,
        session_id: Option<&str>,
    ) -> Result<RunRecord> {
        let frontmatter = document.frontmatter()?;
        let now = Utc::now();
        let today = now.date_naive();
        let ctx = PatternContext::new(today, frontmatter.week_start_day);
        let today_weekday = WeekDay::from_chrono(now.weekday());
        let week_start = week_start_of(today, frontmatter.week_start_day);

        self.buffers.clear_run();
        let mut record = RunRecord::new(global_id, cause, now);

        for section in &document.sections {
            if let Some(mask) = &section.run_on {
                if !mask_allows(mask, today_weekday) {
                    record.step_log.push(StepLogEntry {
                        step_name: section.heading.clone(),
                        outcome: StepOutcome::Skipped {
                            reason: "run_on gate: today is not an allowed day".to_string(),
                        },
                    });
                    continue;
                }
            }

            match self
                .run_section(
                    global_id,
                    document,
                    section,
                    &ctx,
                    now,
                    today,
                    week_start,
                    session_id,
                    &mut record,
                )
                .await
            {
                Ok(outcome) => record.step_log.push(StepLogEntry {
                    step_name: section.heading.clone(),
                    outcome,
                }),
                Err(e) if e.is_step_skip() => {
                    record.step_log.push(StepLogEntry {
                        step_name: section.heading.clone(),
                        outcome: StepOutcome::Skipped {
                            reason: e.to_string(),
                        },
                    });
                }
                Err(e) => {
                    record.step_log.push(StepLogEntry {
                        step_name: section.heading.clone(),
                        outcome: StepOutcome::Failed {
                            kind: e.kind_name().to_string(),
                            message: e.to_string(),
                        },
                    });
                }
            }
        }

        record.finished_at = Some(Utc::now());
        Ok(record)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_section(
        &self,
        global_id: &GlobalId,
        document: &Document,
        section: &Section,
        ctx: &PatternContext,
        now: DateTime<Utc>,
        today: chrono::NaiveDate,
        week_start: chrono::NaiveDate,
        session_id: Option<&str>,
        record: &mut RunRecord,
    ) -> Result<StepOutcome> {
        let pending_dyn = self
            .pending
            .as_ref()
            .map(|p| p.as_ref() as &dyn amd_pattern::PendingLookup);

        let mut resolved_blocks = Vec::with_capacity(section.inputs.len());
        let mut committed: Vec<(String, String, std::path::PathBuf)> = Vec::new();
        for input in &section.inputs {
            let resolved = resolve_input(
                input,
                ctx,
                &self.vault,
                &global_id.0,
                pending_dyn,
                &self.buffers,
                session_id,
                Scope::Run,
            )?;
            let manifest = if input.output.is_some() {
                route_input_output(&self.router, &section.heading, input, &resolved, session_id)?
            } else {
                None
            };
            if resolved.used_pending {
                let pattern = match &input.source {
                    amd_directive::directives::InputSource::File(p) => p.clone(),
                    amd_directive::directives::InputSource::Variable(v) => v.clone(),
                };
                for path in &resolved.source_paths {
                    committed.push((global_id.0.clone(), pattern.clone(), path.clone()));
                }
            }
            // A routed input (one with its own `output=`) contributes the
            // manifest summary of that write, not the raw content, to the
            // composed message (spec.md §4.E step 4).
            let contribution = match manifest {
                Some(entry) => entry.render(),
                None => resolved.content,
            };
            resolved_blocks.push(contribution);
        }

        let (recent_runs_digest, recent_summaries_digest, recent_block) =
            self.resolve_recent(global_id, section);

        let system_message = compose_system_message(document, &self.router);
        let user_message = compose_user_message(&resolved_blocks, &section.body, &recent_block);

        let tool_descriptors: Vec<ToolDescriptor> = section
            .tools
            .iter()
            .map(|t| ToolDescriptor { name: t.name.clone() })
            .collect();

        let (result_text, events) = match &section.model {
            Some(ModelSpec::None) | None => (user_message.clone(), Vec::new()),
            Some(ModelSpec::Alias { alias, thinking }) => {
                if let Some(cache_spec) = &section.cache {
                    if let Some(cached) = self.cache.get(
                        &global_id.0,
                        &section.heading,
                        cache_spec,
                        now,
                        today,
                        week_start,
                        session_id,
                        &document.content_digest,
                        &recent_runs_digest,
                        &recent_summaries_digest,
                    ) {
                        (cached, Vec::new())
                    } else {
                        let (text, events) = self
                            .call_gateway(alias, *thinking, &system_message, &user_message, &tool_descriptors)
                            .await?;
                        self.cache.put(
                            &global_id.0,
                            &section.heading,
                            cache_spec,
                            &text,
                            now,
                            today,
                            week_start,
                            session_id,
                            &document.content_digest,
                            &recent_runs_digest,
                            &recent_summaries_digest,
                        );
                        (text, events)
                    }
                } else {
                    self.call_gateway(alias, *thinking, &system_message, &user_message, &tool_descriptors)
                        .await?
                }
            }
        };

        // React to the model's tool_call_started events rather than
        // unconditionally invoking every declared tool (spec.md §4.G/§4.H.e:
        // tools are offered during generation, not run as an afterthought).
        for event in &events {
            if let EngineEvent::ToolCallStarted { name, .. } = event {
                let Some(tool) = section.tools.iter().find(|t| &t.name == name) else {
                    continue;
                };
                let invocation = self.tools.invoke(&tool.name, &ToolArgs::new()).await;
                match invocation {
                    Ok(tool_result) => {
                        if let Some(destination) = &tool.output {
                            self.router.route(
                                &section.heading,
                                destination,
                                &tool_result.as_text(),
                                tool.write_mode.unwrap_or_default(),
                                session_id,
                                None,
                                &[],
                            )?;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(tool = %tool.name, error = %e, "tool invocation failed, continuing step");
                    }
                }
            }
        }

        for output in &section.outputs {
            let entry = self.router.route(
                &section.heading,
                &output.destination,
                &result_text,
                section.write_mode,
                session_id,
                section.header.as_deref(),
                &[],
            )?;
            match entry.destination {
                amd_router::DestinationSummary::File(path) => {
                    record.output_files.push(path.to_string_lossy().to_string());
                }
                amd_router::DestinationSummary::Variable { stored_as, .. } => {
                    record.variables_created.push(stored_as);
                }
                _ => {}
            }
        }

        if let Some(pending) = &self.pending {
            for (gid, pattern, path) in &committed {
                pending.mark_processed(gid, pattern, path)?;
            }
        }

        Ok(StepOutcome::Completed)
    }

    async fn call_gateway(
        &self,
        alias: &str,
        thinking: bool,
        system_message: &str,
        user_message: &str,
        tools: &[ToolDescriptor],
    ) -> Result<(String, Vec<EngineEvent>)> {
        let events = self
            .gateway
            .complete(alias, system_message, user_message, thinking, tools)
            .await?;
        let mut text = String::new();
        for event in &events {
            match event {
                EngineEvent::Delta { text: delta } => text.push_str(delta),
                EngineEvent::Error { message } => {
                    return Err(amd_core::EngineError::ModelUnavailable(message.clone()))
                }
                _ => {}
            }
        }
        Ok((text, events))
    }

    /// Render the `@recent_runs`/`@recent_summaries` block for `section`, if
    /// it declares either, and the digests that fold into the cache key so
    /// that a change to the underlying run history invalidates a stale cache
    /// hit (SPEC_FULL.md §4.I).
    fn resolve_recent(&self, global_id: &GlobalId, section: &Section) -> (String, String, String) {
        let mut blocks = Vec::new();
        let runs_digest = match &section.recent_runs {
            Some(spec) => {
                let n = recent_spec_limit(*spec);
                let runs = self.run_log.recent(&global_id.0, n).unwrap_or_default();
                let rendered = render_recent_runs(&runs);
                let digest = amd_core::vault::digest_bytes(rendered.as_bytes());
                blocks.push(format!("Recent runs:\n{rendered}"));
                digest
            }
            None => cache::NO_RECENT_SLICE.to_string(),
        };
        let summaries_digest = match &section.recent_summaries {
            Some(spec) => {
                let n = recent_spec_limit(*spec);
                let runs = self.run_log.recent(&global_id.0, n).unwrap_or_default();
                let rendered = render_recent_summaries(&runs, &section.heading);
                let digest = amd_core::vault::digest_bytes(rendered.as_bytes());
                blocks.push(format!("Recent summaries:\n{rendered}"));
                digest
            }
            None => cache::NO_RECENT_SLICE.to_string(),
        };
        (runs_digest, summaries_digest, blocks.join("\n\n"))
    }
}

fn recent_spec_limit(spec: RecentSpec) -> usize {
    match spec {
        RecentSpec::Count(n) => n as usize,
        RecentSpec::All => usize::MAX,
    }
}

fn render_recent_runs(runs: &[RunRecord]) -> String {
    if runs.is_empty() {
        return "(none)".to_string();
    }
    runs.iter()
        .map(|r| {
            format!(
                "- {} ({:?}): {} step(s)",
                r.started_at,
                r.cause,
                r.step_log.len()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the outcome of the matching section heading across `runs` as a
/// stand-in "summary" of that section's prior outputs — `RunRecord` doesn't
/// persist assistant text, only outcome metadata, so this is as close as
/// `@recent_summaries` can get without a separate output log (SPEC_FULL.md
/// §4.I, recorded as an Open Question decision in DESIGN.md).
fn render_recent_summaries(runs: &[RunRecord], heading: &str) -> String {
    let lines: Vec<String> = runs
        .iter()
        .filter_map(|r| r.step_log.iter().find(|s| s.step_name == heading))
        .map(|entry| match &entry.outcome {
            StepOutcome::Completed => "- completed".to_string(),
            StepOutcome::Skipped { reason } => format!("- skipped: {reason}"),
            StepOutcome::Failed { message, .. } => format!("- failed: {message}"),
        })
        .collect();
    if lines.is_empty() {
        "(none)".to_string()
    } else {
        lines.join("\n")
    }
}

fn mask_allows(mask: &DayMask, today: WeekDay) -> bool {
    mask.allows(today)
}

fn compose_system_message(document: &Document, router: &Router) -> String {
    let mut parts = Vec::new();
    if let Some(instructions) = &document.instructions {
        parts.push(instructions.clone());
    }
    let context = router.peek_context();
    if !context.is_empty() {
        parts.push(context);
    }
    parts.join("\n\n")
}

fn compose_user_message(resolved_inputs: &[String], body: &str, recent_block: &str) -> String {
    let mut parts: Vec<&str> = resolved_inputs.iter().map(|s| s.as_str()).filter(|s| !s.is_empty()).collect();
    if !recent_block.is_empty() {
        parts.push(recent_block);
    }
    if !body.is_empty() {
        parts.push(body);
    }
    parts.join("\n\n")
}
