//! Typed directive vocabulary (spec.md §3 "Step / Section", §6 directive
//! table). A closed tagged variant per Design Notes §9 — unknown directive
//! names are rejected at parse time rather than silently ignored.

use amd_core::{DayMask, Destination, EngineError, Scope, WriteMode};

use crate::params::ParamList;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(String),
    Variable(String),
}

/// `properties` modifier: `properties` alone means "emit frontmatter,
/// unfiltered"; `properties="K1,K2"` filters to the named keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertiesFilter {
    All,
    Keys(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub source: InputSource,
    pub required: bool,
    pub refs_only: bool,
    pub head: Option<usize>,
    pub properties: Option<PropertiesFilter>,
    pub output: Option<Destination>,
    pub write_mode: WriteMode,
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub destination: Destination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSpec {
    None,
    Alias { alias: String, thinking: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub output: Option<Destination>,
    pub write_mode: Option<WriteMode>,
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSpec {
    Session,
    Daily,
    Weekly,
    DurationSeconds(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecentSpec {
    Count(u32),
    All,
}

pub fn parse_properties(params: &ParamList) -> Option<PropertiesFilter> {
    if let Some(raw) = params.get("properties") {
        if raw.is_empty() {
            return Some(PropertiesFilter::All);
        }
        let keys = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        return Some(PropertiesFilter::Keys(keys));
    }
    if params.has_flag("properties") {
        return Some(PropertiesFilter::All);
    }
    None
}

pub fn parse_input(value: &str, params: &ParamList, line: usize) -> Result<InputSpec, EngineError> {
    let source = parse_input_source(value, line)?;
    let required = params.has_flag("required");
    let refs_only = params.has_flag("refs_only") || params.has_flag("refs-only");
    let head = match params.get("head") {
        Some(n) => Some(n.parse::<usize>().map_err(|_| EngineError::DirectiveParseError {
            line,
            name: "@input".into(),
            reason: format!("invalid head=N value '{n}'"),
        })?),
        None => None,
    };
    let properties = parse_properties(params);
    let scope = match params.get("scope") {
        Some(s) => Some(Scope::parse(s).ok_or_else(|| EngineError::DirectiveParseError {
            line,
            name: "@input".into(),
            reason: format!("invalid scope '{s}'"),
        })?),
        None => None,
    };
    let write_mode = match params.get("write_mode") {
        Some(w) => WriteMode::parse(w).ok_or_else(|| EngineError::DirectiveParseError {
            line,
            name: "@input".into(),
            reason: format!("invalid write_mode '{w}'"),
        })?,
        None => WriteMode::default(),
    };
    let output = match params.get("output") {
        Some(dest) => Some(
            Destination::parse(dest, scope).map_err(|_| EngineError::DirectiveParseError {
                line,
                name: "@input".into(),
                reason: format!("invalid output destination '{dest}'"),
            })?,
        ),
        None => None,
    };
    Ok(InputSpec {
        source,
        required,
        refs_only,
        head,
        properties,
        output,
        write_mode,
        scope,
    })
}

fn parse_input_source(value: &str, line: usize) -> Result<InputSource, EngineError> {
    if let Some(rest) = value.strip_prefix("file:") {
        return Ok(InputSource::File(rest.trim().to_string()));
    }
    if let Some(rest) = value.strip_prefix("variable:") {
        return Ok(InputSource::Variable(rest.trim().to_string()));
    }
    Err(EngineError::DirectiveParseError {
        line,
        name: "@input".into(),
        reason: format!("expected 'file:' or 'variable:' prefix, got '{value}'"),
    })
}

pub fn parse_output(value: &str, params: &ParamList, line: usize) -> Result<OutputSpec, EngineError> {
    let scope = match params.get("scope") {
        Some(s) => Some(Scope::parse(s).ok_or_else(|| EngineError::DirectiveParseError {
            line,
            name: "@output".into(),
            reason: format!("invalid scope '{s}'"),
        })?),
        None => None,
    };
    let destination =
        Destination::parse(value, scope).map_err(|_| EngineError::DirectiveParseError {
            line,
            name: "@output".into(),
            reason: format!("invalid destination '{value}'"),
        })?;
    Ok(OutputSpec { destination })
}

pub fn parse_model(value: &str, params: &ParamList) -> ModelSpec {
    if value.trim() == "none" {
        return ModelSpec::None;
    }
    let thinking = params.has_flag("thinking")
        || params.get("thinking").map(|v| v == "true").unwrap_or(false);
    ModelSpec::Alias {
        alias: value.trim().to_string(),
        thinking,
    }
}

pub fn parse_tools(value: &str, line: usize) -> Result<Vec<ToolSpec>, EngineError> {
    let mut tools = Vec::new();
    for token in split_tool_tokens(value) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (name, params_str) = match token.find('(') {
            Some(open) if token.ends_with(')') => (
                token[..open].trim().to_string(),
                &token[open + 1..token.len() - 1],
            ),
            _ => (token.to_string(), ""),
        };
        let (_, params) = crate::params::split_value_and_params(&format!("x ({params_str})"), line)?;
        let output = match params.get("output") {
            Some(dest) => Some(Destination::parse(dest, None).map_err(|_| {
                EngineError::DirectiveParseError {
                    line,
                    name: "@tools".into(),
                    reason: format!("invalid output destination '{dest}'"),
                }
            })?),
            None => None,
        };
        let write_mode = match params.get("write_mode") {
            Some(w) => Some(WriteMode::parse(w).ok_or_else(|| EngineError::DirectiveParseError {
                line,
                name: "@tools".into(),
                reason: format!("invalid write_mode '{w}'"),
            })?),
            None => None,
        };
        let scope = match params.get("scope") {
            Some(s) => Some(Scope::parse(s).ok_or_else(|| EngineError::DirectiveParseError {
                line,
                name: "@tools".into(),
                reason: format!("invalid scope '{s}'"),
            })?),
            None => None,
        };
        tools.push(ToolSpec {
            name,
            output,
            write_mode,
            scope,
        });
    }
    Ok(tools)
}

/// Split `name1(k=v), name2` on commas that are not inside a `(...)` group.
fn split_tool_tokens(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for c in value.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => tokens.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Aggregate tool tokens across multiple `@tools` directives: union by
/// name, last-`output=`/`write_mode=`/`scope=` wins (spec.md §4.F).
pub fn aggregate_tools(all: Vec<ToolSpec>) -> Vec<ToolSpec> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: std::collections::HashMap<String, ToolSpec> = std::collections::HashMap::new();
    for spec in all {
        if !merged.contains_key(&spec.name) {
            order.push(spec.name.clone());
        }
        merged
            .entry(spec.name.clone())
            .and_modify(|existing| {
                if spec.output.is_some() {
                    existing.output = spec.output.clone();
                }
                if spec.write_mode.is_some() {
                    existing.write_mode = spec.write_mode;
                }
                if spec.scope.is_some() {
                    existing.scope = spec.scope;
                }
            })
            .or_insert(spec);
    }
    order.into_iter().filter_map(|name| merged.remove(&name)).collect()
}

pub fn parse_run_on(value: &str, line: usize) -> Result<DayMask, EngineError> {
    DayMask::parse(value).ok_or_else(|| EngineError::DirectiveParseError {
        line,
        name: "@run_on".into(),
        reason: format!("invalid day mask '{value}'"),
    })
}

pub fn parse_cache(value: &str, line: usize) -> Result<CacheSpec, EngineError> {
    let trimmed = value.trim();
    match trimmed {
        "session" => return Ok(CacheSpec::Session),
        "daily" => return Ok(CacheSpec::Daily),
        "weekly" => return Ok(CacheSpec::Weekly),
        _ => {}
    }
    let (num, unit) = trimmed.split_at(trimmed.len().saturating_sub(1));
    let n: u64 = num.parse().map_err(|_| EngineError::DirectiveParseError {
        line,
        name: "@cache".into(),
        reason: format!("invalid cache duration '{value}'"),
    })?;
    let seconds = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        "d" => n * 86400,
        _ => {
            return Err(EngineError::DirectiveParseError {
                line,
                name: "@cache".into(),
                reason: format!("invalid cache duration unit in '{value}'"),
            })
        }
    };
    Ok(CacheSpec::DurationSeconds(seconds))
}

pub fn parse_recent(value: &str, line: usize, name: &str) -> Result<RecentSpec, EngineError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("all") {
        return Ok(RecentSpec::All);
    }
    trimmed
        .parse::<u32>()
        .map(RecentSpec::Count)
        .map_err(|_| EngineError::DirectiveParseError {
            line,
            name: name.into(),
            reason: format!("invalid integer '{trimmed}'"),
        })
}
