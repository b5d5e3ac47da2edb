//! Frontmatter: YAML between `---` fences (spec.md §4.B).

use amd_core::{EngineError, WeekDay};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSpec {
    Cron(String),
    Once(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughRuns {
    Count(u32),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frontmatter {
    pub workflow_engine: String,
    pub schedule: Option<ScheduleSpec>,
    pub enabled: bool,
    pub week_start_day: WeekDay,
    pub description: Option<String>,
    pub passthrough_runs: Option<PassthroughRuns>,
    pub token_threshold: Option<u64>,
}

/// Raw deserialization target; `RawFrontmatter` accepts any keys, which the
/// typed conversion below validates against spec.md §4.B/§6.
#[derive(Debug, Deserialize, Default)]
struct RawFrontmatter {
    #[serde(default)]
    workflow_engine: Option<String>,
    #[serde(default)]
    schedule: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    week_start_day: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    passthrough_runs: Option<serde_yaml::Value>,
    #[serde(default)]
    token_threshold: Option<u64>,
}

/// Split `content` into `(frontmatter_yaml, body)`. Returns an error if the
/// file does not open with a `---` fence.
pub fn split_frontmatter(content: &str) -> Result<(String, String), EngineError> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return Err(EngineError::DirectiveParseError {
            line: 1,
            name: "frontmatter".into(),
            reason: "file must start with '---'".into(),
        });
    }
    let after_first = &trimmed[3..];
    let close = after_first.find("\n---").ok_or_else(|| EngineError::DirectiveParseError {
        line: 1,
        name: "frontmatter".into(),
        reason: "unclosed frontmatter: missing closing '---'".into(),
    })?;
    let fm_text = after_first[..close].to_string();
    let rest_start = close + 4;
    let body = if rest_start < after_first.len() {
        after_first[rest_start..].trim_start_matches('\n').to_string()
    } else {
        String::new()
    };
    Ok((fm_text, body))
}

pub fn parse_frontmatter(fm_text: &str) -> Result<Frontmatter, EngineError> {
    let raw: RawFrontmatter =
        serde_yaml::from_str(fm_text).map_err(|e| EngineError::DirectiveParseError {
            line: 1,
            name: "frontmatter".into(),
            reason: format!("invalid YAML: {e}"),
        })?;

    let workflow_engine = raw.workflow_engine.unwrap_or_else(|| "step".to_string());
    if workflow_engine != "step" {
        return Err(EngineError::DirectiveParseError {
            line: 1,
            name: "workflow_engine".into(),
            reason: format!("unknown engine '{workflow_engine}', expected 'step'"),
        });
    }

    let schedule = match raw.schedule {
        None => None,
        Some(s) => Some(parse_schedule_shape(&s)?),
    };

    let week_start_day = match raw.week_start_day {
        None => WeekDay::Monday,
        Some(s) => WeekDay::parse(&s).ok_or_else(|| EngineError::DirectiveParseError {
            line: 1,
            name: "week_start_day".into(),
            reason: format!("unknown day name '{s}'"),
        })?,
    };

    let passthrough_runs = match raw.passthrough_runs {
        None => None,
        Some(serde_yaml::Value::String(s)) if s.eq_ignore_ascii_case("all") => {
            Some(PassthroughRuns::All)
        }
        Some(serde_yaml::Value::Number(n)) => {
            let n = n.as_u64().ok_or_else(|| EngineError::DirectiveParseError {
                line: 1,
                name: "passthrough_runs".into(),
                reason: "must be a non-negative integer or 'all'".into(),
            })?;
            Some(PassthroughRuns::Count(n as u32))
        }
        Some(_) => {
            return Err(EngineError::DirectiveParseError {
                line: 1,
                name: "passthrough_runs".into(),
                reason: "must be a non-negative integer or 'all'".into(),
            })
        }
    };

    Ok(Frontmatter {
        workflow_engine,
        schedule,
        enabled: raw.enabled.unwrap_or(true),
        week_start_day,
        description: raw.description,
        passthrough_runs,
        token_threshold: raw.token_threshold,
    })
}

fn parse_schedule_shape(raw: &str) -> Result<ScheduleSpec, EngineError> {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("cron:") {
        let expr = rest.trim();
        if expr.split_whitespace().count() != 5 {
            return Err(EngineError::DirectiveParseError {
                line: 1,
                name: "schedule".into(),
                reason: format!("cron expression must have 5 fields: '{expr}'"),
            });
        }
        return Ok(ScheduleSpec::Cron(expr.to_string()));
    }
    if let Some(rest) = trimmed.strip_prefix("once:") {
        return Ok(ScheduleSpec::Once(rest.trim().to_string()));
    }
    Err(EngineError::DirectiveParseError {
        line: 1,
        name: "schedule".into(),
        reason: format!("expected 'cron: <5-field>' or 'once: <datetime>', got '{trimmed}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_frontmatter_extracts_yaml_and_body() {
        let content = "---\nworkflow_engine: step\n---\n## Step One\nbody\n";
        let (fm, body) = split_frontmatter(content).unwrap();
        assert_eq!(fm.trim(), "workflow_engine: step");
        assert_eq!(body, "## Step One\nbody\n");
    }

    #[test]
    fn missing_opening_fence_is_error() {
        let err = split_frontmatter("no frontmatter here").unwrap_err();
        assert!(matches!(err, EngineError::DirectiveParseError { .. }));
    }

    #[test]
    fn parses_cron_schedule() {
        let fm = parse_frontmatter("schedule: \"cron: 0 9 * * *\"\nenabled: true\n").unwrap();
        assert_eq!(fm.schedule, Some(ScheduleSpec::Cron("0 9 * * *".into())));
        assert!(fm.enabled);
    }

    #[test]
    fn parses_once_schedule() {
        let fm = parse_frontmatter("schedule: \"once: 2030-01-01 09:00\"\n").unwrap();
        assert_eq!(
            fm.schedule,
            Some(ScheduleSpec::Once("2030-01-01 09:00".into()))
        );
    }

    #[test]
    fn rejects_malformed_cron_field_count() {
        let err = parse_frontmatter("schedule: \"cron: 0 9 * *\"\n").unwrap_err();
        assert!(matches!(err, EngineError::DirectiveParseError { .. }));
    }

    #[test]
    fn rejects_unknown_engine() {
        let err = parse_frontmatter("workflow_engine: dag\n").unwrap_err();
        assert!(matches!(err, EngineError::DirectiveParseError { .. }));
    }

    #[test]
    fn passthrough_runs_accepts_all_or_count() {
        let fm = parse_frontmatter("passthrough_runs: all\n").unwrap();
        assert_eq!(fm.passthrough_runs, Some(PassthroughRuns::All));
        let fm = parse_frontmatter("passthrough_runs: 3\n").unwrap();
        assert_eq!(fm.passthrough_runs, Some(PassthroughRuns::Count(3)));
    }

    #[test]
    fn defaults_when_fields_absent() {
        let fm = parse_frontmatter("description: test\n").unwrap();
        assert_eq!(fm.workflow_engine, "step");
        assert!(fm.enabled);
        assert_eq!(fm.week_start_day, WeekDay::Monday);
        assert_eq!(fm.schedule, None);
    }
}
