//! Shared routing vocabulary: buffer scope, write mode, and router
//! destination. Lives in `amd-core` so `amd-directive`, `amd-buffer`, and
//! `amd-router` can all reference the same types without a dependency
//! cycle.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Lifetime scope of a named buffer (spec.md §3 "Buffer").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Lifetime = one engine invocation.
    Run,
    /// Lifetime = one chat session.
    Session,
}

impl Scope {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" => Some(Self::Run),
            "session" => Some(Self::Session),
            _ => None,
        }
    }
}

/// `@write_mode` directive value (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WriteMode {
    #[default]
    Append,
    Replace,
    New,
}

impl WriteMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Some(Self::Append),
            "replace" => Some(Self::Replace),
            "new" => Some(Self::New),
            _ => None,
        }
    }
}

/// `@output`/tool `output=` destination (spec.md §4.D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Inline,
    Variable { name: String, scope: Option<Scope> },
    File(String),
    Context,
    Discard,
}

impl Destination {
    /// Parse a destination token such as `variable:foo (scope=session)` —
    /// the `(scope=...)` part is parsed separately by the directive parser
    /// and passed in as `scope`; this function parses the bare
    /// `dest:value` shape.
    pub fn parse(token: &str, scope: Option<Scope>) -> Result<Self> {
        let trimmed = token.trim();
        if trimmed == "inline" {
            return Ok(Self::Inline);
        }
        if trimmed == "context" {
            return Ok(Self::Context);
        }
        if trimmed == "discard" {
            return Ok(Self::Discard);
        }
        if let Some(rest) = trimmed.strip_prefix("variable:") {
            if rest.is_empty() {
                return Err(EngineError::DirectiveParseError {
                    line: 0,
                    name: "@output".into(),
                    reason: "variable: destination missing a name".into(),
                });
            }
            return Ok(Self::Variable {
                name: rest.trim().to_string(),
                scope,
            });
        }
        if let Some(rest) = trimmed.strip_prefix("file:") {
            if rest.is_empty() {
                return Err(EngineError::DirectiveParseError {
                    line: 0,
                    name: "@output".into(),
                    reason: "file: destination missing a path".into(),
                });
            }
            return Ok(Self::File(rest.trim().to_string()));
        }
        Err(EngineError::DirectiveParseError {
            line: 0,
            name: "@output".into(),
            reason: format!("unrecognized destination '{trimmed}'"),
        })
    }
}
