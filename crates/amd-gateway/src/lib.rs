//! G. LLM Gateway (spec.md §4.G): resolves a step's model alias to a
//! provider, offers the step's declared tools, and reports the model's
//! response as an ordered [`EngineEvent`] stream (`delta`, `tool_call_started`,
//! `tool_call_finished`, `done`, `error`). Provider-agnostic per spec.md §6's
//! outbound boundary; this crate ships one reference provider,
//! [`EchoProvider`], used by tests and as the default alias target when no
//! real key is configured.

use std::collections::HashMap;
use std::sync::Arc;

use amd_core::{EngineError, EngineEvent, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One chat turn, used both to compose a request and to represent a chat
/// session's history (SPEC_FULL.md §4.I).
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A tool offered to the model during generation (spec.md §4.G). The
/// provider decides, per its own policy, which offered tools (if any) to
/// invoke — the engine reacts to the resulting `tool_call_started` events
/// rather than invoking every declared tool unconditionally.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
}

/// A provider backend. Real provider SDKs are out of scope (spec.md §1);
/// this trait is the seam a production build plugs them into. Returns the
/// ordered event stream for one completion; `tool_call_started` events name
/// tools the provider wants invoked, `tool_call_finished` is appended by the
/// caller once it has actually run them.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        thinking: bool,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<EngineEvent>>;
}

/// Reference provider: deterministic, network-free. "Calls" every offered
/// tool (so gateway/tool-routing plumbing can be exercised end-to-end),
/// then emits the last user message as a single `delta`, optionally
/// prefixed to simulate a "thinking" preamble.
pub struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    async fn complete(
        &self,
        _model: &str,
        _system_prompt: &str,
        user_prompt: &str,
        thinking: bool,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<EngineEvent>> {
        let mut events = Vec::with_capacity(tools.len() + 2);
        for tool in tools {
            events.push(EngineEvent::ToolCallStarted {
                id: format!("call-{}", tool.name),
                name: tool.name.clone(),
                args: serde_json::Value::Null,
            });
        }
        let text = if thinking {
            format!("[thinking]\n{user_prompt}")
        } else {
            user_prompt.to_string()
        };
        events.push(EngineEvent::Delta { text });
        events.push(EngineEvent::Done);
        Ok(events)
    }
}

/// One entry in `settings.yaml`'s `models:` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
}

/// Model alias table plus provider instances, resolved once at runtime
/// bootstrap (SPEC_FULL.md §4.G).
#[derive(Clone)]
pub struct Gateway {
    models: HashMap<String, ModelConfig>,
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl Gateway {
    pub fn new(models: HashMap<String, ModelConfig>, providers: HashMap<String, Arc<dyn Provider>>) -> Self {
        Self { models, providers }
    }

    /// Default gateway wired with a single `gpt-mini` alias pointed at
    /// [`EchoProvider`] — used by components/tests that don't care about
    /// the real model table.
    pub fn with_echo_default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "gpt-mini".to_string(),
            ModelConfig {
                provider: "echo".to_string(),
                model: "gpt-mini".to_string(),
            },
        );
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        providers.insert("echo".to_string(), Arc::new(EchoProvider));
        Self::new(models, providers)
    }

    pub fn resolve_model(&self, alias: &str) -> Result<(&ModelConfig, Arc<dyn Provider>)> {
        let config = self
            .models
            .get(alias)
            .ok_or_else(|| EngineError::ModelUnavailable(format!("unknown alias '{alias}'")))?;
        let provider = self
            .providers
            .get(&config.provider)
            .cloned()
            .ok_or_else(|| {
                EngineError::ModelUnavailable(format!(
                    "provider '{}' not configured for alias '{alias}'",
                    config.provider
                ))
            })?;
        Ok((config, provider))
    }

    /// Dispatch one completion and return its ordered event stream
    /// (spec.md §4.G: `(model_alias, system_prompt, user_prompt, tools) →
    /// {delta, tool_call_started, tool_call_finished, done, error}`).
    pub async fn complete(
        &self,
        alias: &str,
        system_prompt: &str,
        user_prompt: &str,
        thinking: bool,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<EngineEvent>> {
        let (config, provider) = self.resolve_model(alias)?;
        tracing::debug!(alias, model = %config.model, tool_count = tools.len(), "gateway dispatching completion");
        provider
            .complete(&config.model, system_prompt, user_prompt, thinking, tools)
            .await
    }
}

/// Opaque monotonic token estimator (SPEC_FULL.md §4.G, resolving spec.md's
/// Open Question): `max(1, chars / 4)`. Not a tokenizer — an approximation
/// used only to gate `@cache`/token-threshold decisions.
pub fn estimate_tokens(text: &str) -> u64 {
    std::cmp::max(1, text.chars().count() as u64 / 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_delta(events: &[EngineEvent]) -> &str {
        events
            .iter()
            .find_map(|e| match e {
                EngineEvent::Delta { text } => Some(text.as_str()),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn echo_provider_returns_user_message_as_a_delta() {
        let gateway = Gateway::with_echo_default();
        let events = gateway
            .complete("gpt-mini", "be terse", "write a haiku", false, &[])
            .await
            .unwrap();
        assert_eq!(last_delta(&events), "write a haiku");
        assert!(matches!(events.last(), Some(EngineEvent::Done)));
    }

    #[tokio::test]
    async fn thinking_flag_prefixes_response() {
        let gateway = Gateway::with_echo_default();
        let events = gateway.complete("gpt-mini", "", "x", true, &[]).await.unwrap();
        assert!(last_delta(&events).starts_with("[thinking]"));
    }

    #[tokio::test]
    async fn offered_tools_each_emit_a_tool_call_started_event() {
        let gateway = Gateway::with_echo_default();
        let tools = vec![ToolDescriptor { name: "web_search".into() }];
        let events = gateway.complete("gpt-mini", "", "x", false, &tools).await.unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::ToolCallStarted { name, .. } if name == "web_search"
        )));
    }

    #[tokio::test]
    async fn unknown_alias_is_model_unavailable() {
        let gateway = Gateway::with_echo_default();
        let err = gateway.complete("no-such-alias", "", "", false, &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::ModelUnavailable(_)));
    }

    #[test]
    fn estimate_tokens_is_monotonic_and_floors_at_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert!(estimate_tokens("a longer string of words") > estimate_tokens("short"));
    }
}
