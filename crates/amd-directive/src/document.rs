//! Body parsing: level-2 headings, directive blocks, and prompt bodies
//! (spec.md §4.B). Produces one typed AST ([`Document`]) consumed by both
//! the Loader (validation) and the Step Engine (execution) — never
//! re-parsed at run time (Design Notes §9).

use amd_core::{DayMask, EngineError, WriteMode};

use crate::directives::{
    aggregate_tools, parse_cache, parse_input, parse_model, parse_output, parse_recent,
    parse_run_on, parse_tools, CacheSpec, InputSpec, ModelSpec, OutputSpec, RecentSpec, ToolSpec,
};
use crate::frontmatter::{parse_frontmatter, split_frontmatter, Frontmatter};
use crate::params::split_value_and_params;

#[derive(Debug, Clone, Default)]
pub struct Section {
    pub heading: String,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
    pub header: Option<String>,
    pub model: Option<ModelSpec>,
    pub tools: Vec<ToolSpec>,
    pub write_mode: WriteMode,
    pub run_on: Option<DayMask>,
    pub cache: Option<CacheSpec>,
    pub recent_runs: Option<RecentSpec>,
    pub recent_summaries: Option<RecentSpec>,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub frontmatter_raw: String,
    pub instructions: Option<String>,
    pub chat_instructions: Option<String>,
    pub context_instructions: Option<String>,
    pub sections: Vec<Section>,
    /// SHA-256 digest of the raw source this document was parsed from
    /// (SPEC_FULL.md §4.I cache-key tuple: editing a template invalidates
    /// every cached section output keyed against its prior digest).
    pub content_digest: String,
}

impl Document {
    pub fn frontmatter(&self) -> Result<Frontmatter, EngineError> {
        parse_frontmatter(&self.frontmatter_raw)
    }
}

enum BlockRole {
    Instructions,
    ChatInstructions,
    ContextInstructions,
    Section,
}

fn classify_heading(heading: &str) -> BlockRole {
    match heading.trim().to_ascii_lowercase().as_str() {
        "instructions" => BlockRole::Instructions,
        "chat instructions" => BlockRole::ChatInstructions,
        "context instructions" => BlockRole::ContextInstructions,
        _ => BlockRole::Section,
    }
}

/// Parse a complete workflow/context-template markdown file.
pub fn parse_document(content: &str) -> Result<Document, EngineError> {
    let (fm_raw, body) = split_frontmatter(content)?;
    // Validate eagerly so typos surface at load time even if the caller
    // never calls `.frontmatter()`.
    parse_frontmatter(&fm_raw)?;

    let fm_line_count = content.len() - body.len();
    let body_start_line = content[..fm_line_count].lines().count();

    let mut doc = Document {
        frontmatter_raw: fm_raw,
        content_digest: amd_core::vault::digest_bytes(content.as_bytes()),
        ..Default::default()
    };

    let lines: Vec<&str> = body.lines().collect();
    let mut i = 0usize;
    while i < lines.len() {
        let line = lines[i];
        if let Some(heading) = line.strip_prefix("## ") {
            let block_start = i + 1;
            let mut j = i + 1;
            while j < lines.len() && !lines[j].starts_with("## ") {
                j += 1;
            }
            let block_lines = &lines[block_start..j];
            let absolute_line_no = body_start_line + block_start + 1;
            match classify_heading(heading) {
                BlockRole::Instructions => {
                    doc.instructions = Some(block_lines.join("\n").trim().to_string());
                }
                BlockRole::ChatInstructions => {
                    doc.chat_instructions = Some(block_lines.join("\n").trim().to_string());
                }
                BlockRole::ContextInstructions => {
                    doc.context_instructions = Some(block_lines.join("\n").trim().to_string());
                }
                BlockRole::Section => {
                    let section =
                        parse_section(heading.trim(), block_lines, absolute_line_no)?;
                    doc.sections.push(section);
                }
            }
            i = j;
        } else {
            i += 1;
        }
    }

    Ok(doc)
}

fn normalize_name(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('-', "_")
}

fn parse_section(heading: &str, lines: &[&str], start_line: usize) -> Result<Section, EngineError> {
    let mut section = Section {
        heading: heading.to_string(),
        write_mode: WriteMode::Append,
        ..Default::default()
    };

    let mut idx = 0usize;
    let mut in_directives = true;
    while idx < lines.len() {
        let raw_line = lines[idx];
        let line_no = start_line + idx;
        let trimmed = raw_line.trim();

        if !in_directives {
            break;
        }
        if trimmed.is_empty() {
            idx += 1;
            continue;
        }
        if !trimmed.starts_with('@') {
            in_directives = false;
            break;
        }

        let without_at = &trimmed[1..];
        let (raw_name, tail) = match without_at.split_once(char::is_whitespace) {
            Some((n, t)) => (n.trim_end_matches(':'), t),
            None => (without_at.trim_end_matches(':'), ""),
        };
        let name = normalize_name(raw_name);
        let (value, params) = split_value_and_params(tail, line_no)?;

        match name.as_str() {
            "input" => section.inputs.push(parse_input(&value, &params, line_no)?),
            "output" => section.outputs.push(parse_output(&value, &params, line_no)?),
            "header" => section.header = Some(value),
            "model" => section.model = Some(parse_model(&value, &params)),
            "tools" => {
                let tokens = parse_tools(&value, line_no)?;
                section.tools.extend(tokens);
            }
            "write_mode" => {
                section.write_mode = WriteMode::parse(&value).ok_or_else(|| {
                    EngineError::DirectiveParseError {
                        line: line_no,
                        name: "@write_mode".into(),
                        reason: format!("invalid write mode '{value}'"),
                    }
                })?;
            }
            "run_on" => section.run_on = Some(parse_run_on(&value, line_no)?),
            "cache" => section.cache = Some(parse_cache(&value, line_no)?),
            "recent_runs" => {
                section.recent_runs = Some(parse_recent(&value, line_no, "@recent_runs")?);
            }
            "recent_summaries" => {
                section.recent_summaries =
                    Some(parse_recent(&value, line_no, "@recent_summaries")?);
            }
            other => {
                return Err(EngineError::DirectiveParseError {
                    line: line_no,
                    name: format!("@{other}"),
                    reason: "unknown directive".into(),
                });
            }
        }
        idx += 1;
    }

    section.tools = aggregate_tools(std::mem::take(&mut section.tools));
    section.body = lines[idx..].join("\n").trim().to_string();
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amd_core::Destination;

    const DOC: &str = r#"---
workflow_engine: step
schedule: "cron: 0 9 * * *"
enabled: true
---
## Instructions
Be concise.

## Write Haiku
@output file: test/{today}
@model gpt-mini
Write a haiku for the current season.

## Critique Haiku
@input file: test/{today}
@output file: test/{today} (write_mode=append)
@model gpt-mini
Critique the haiku above.
"#;

    #[test]
    fn parses_instructions_and_sections_in_order() {
        let doc = parse_document(DOC).unwrap();
        assert_eq!(doc.instructions.as_deref(), Some("Be concise."));
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].heading, "Write Haiku");
        assert_eq!(doc.sections[1].heading, "Critique Haiku");
    }

    #[test]
    fn section_outputs_and_model_parsed() {
        let doc = parse_document(DOC).unwrap();
        let step1 = &doc.sections[0];
        assert_eq!(step1.outputs.len(), 1);
        assert_eq!(
            step1.outputs[0].destination,
            Destination::File("test/{today}".into())
        );
        assert_eq!(step1.body, "Write a haiku for the current season.");
    }

    #[test]
    fn directive_stops_at_first_prose_line() {
        let content = "---\n---\n## S\n@model gpt-mini\nprose line\n@output file:x.md\n";
        let doc = parse_document(content).unwrap();
        assert_eq!(doc.sections[0].outputs.len(), 0);
        assert!(doc.sections[0].body.contains("@output file:x.md"));
    }

    #[test]
    fn unknown_directive_is_parse_error() {
        let content = "---\n---\n## S\n@bogus value\nbody\n";
        let err = parse_document(content).unwrap_err();
        assert!(matches!(err, EngineError::DirectiveParseError { .. }));
    }

    #[test]
    fn chat_instructions_only_template_has_no_sections() {
        let content = "---\n---\n## Chat Instructions\nBe concise.\n";
        let doc = parse_document(content).unwrap();
        assert_eq!(doc.chat_instructions.as_deref(), Some("Be concise."));
        assert!(doc.sections.is_empty());
    }

    #[test]
    fn name_matching_is_tolerant_of_dash_and_underscore() {
        let content = "---\n---\n## S\n@run-on friday\nbody\n";
        let doc = parse_document(content).unwrap();
        assert!(doc.sections[0].run_on.is_some());
    }
}
