//! The engine-wide error taxonomy (spec.md §7).

/// A structured engine error kind. Every fallible engine operation resolves
/// to one of these variants; callers that need to persist an error (e.g. in
/// a `RunRecord`) should go through [`EngineError::kind_name`] rather than
/// storing the `thiserror` value itself.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("directive parse error at line {line}: {name}: {reason}")]
    DirectiveParseError {
        line: usize,
        name: String,
        reason: String,
    },

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("vault boundary violation: {0}")]
    VaultBoundary(String),

    #[error("required input yielded no matches: {0}")]
    InputMissing(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("tool error in '{tool}': {message}")]
    ToolError { tool: String, message: String },

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("buffer limit exceeded: {0}")]
    BufferLimitExceeded(String),

    #[error("schedule parse error: {0}")]
    ScheduleParseError(String),

    #[error("runtime accessed before bootstrap")]
    RuntimeStateError,

    #[error("config repair needed: {0}")]
    ConfigRepairNeeded(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    /// Stable, lowercase-snake kind name suitable for persistence in a
    /// `RunRecord` (plain strings, not the error type itself).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::DirectiveParseError { .. } => "directive_parse_error",
            Self::InvalidPattern(_) => "invalid_pattern",
            Self::VaultBoundary(_) => "vault_boundary",
            Self::InputMissing(_) => "input_missing",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::ToolError { .. } => "tool_error",
            Self::Timeout(_) => "timeout",
            Self::BufferLimitExceeded(_) => "buffer_limit_exceeded",
            Self::ScheduleParseError(_) => "schedule_parse_error",
            Self::RuntimeStateError => "runtime_state_error",
            Self::ConfigRepairNeeded(_) => "config_repair_needed",
            Self::Io(_) => "io_error",
            Self::Yaml(_) => "yaml_error",
        }
    }

    /// Whether the Step Engine should recover from this error by skipping
    /// the step (vs. aborting the run). Only `InputMissing` is recoverable
    /// unconditionally; `ToolError` recovery is decided by the caller based
    /// on whether the tool is marked critical.
    pub fn is_step_skip(&self) -> bool {
        matches!(self, Self::InputMissing(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_name_is_stable() {
        let err = EngineError::InputMissing("inbox/*.md".into());
        assert_eq!(err.kind_name(), "input_missing");
        assert!(err.is_step_skip());
    }

    #[test]
    fn tool_error_is_not_skip() {
        let err = EngineError::ToolError {
            tool: "web_search".into(),
            message: "quota exceeded".into(),
        };
        assert!(!err.is_step_skip());
        assert_eq!(err.to_string(), "tool error in 'web_search': quota exceeded");
    }

    #[test]
    fn display_directive_parse_error() {
        let err = EngineError::DirectiveParseError {
            line: 12,
            name: "@input".into(),
            reason: "missing pattern".into(),
        };
        assert_eq!(
            err.to_string(),
            "directive parse error at line 12: @input: missing pattern"
        );
    }
}
