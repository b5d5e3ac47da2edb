//! E. Input Resolver (spec.md §4.E): expands an `@input` directive into the
//! text handed to the Step Engine, applying the `refs_only > properties >
//! head` modifier precedence, then (optionally) routes a copy of that text
//! through the Router per the directive's own `output=` parameter.

use std::path::PathBuf;

use amd_buffer::BufferStore;
use amd_core::{EngineError, Result, Scope, Vault, WriteMode};
use amd_directive::directives::{InputSource, InputSpec, PropertiesFilter};
use amd_pattern::{resolve_file_list, PatternContext, PendingLookup};
use amd_router::{ManifestEntry, Router};

const JOIN_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone)]
pub struct ResolvedInput {
    /// Text to splice into the step's composed message.
    pub content: String,
    /// Vault-relative paths that contributed content, in selection order —
    /// the engine commits these to Pending State only after the step
    /// succeeds (spec.md §8 "Pending idempotence").
    pub source_paths: Vec<PathBuf>,
    pub used_pending: bool,
}

/// Resolve one `@input` directive. `session_id` is only consulted for
/// `variable:` sources with `scope=session` (or default session scope when
/// the caller is a chat turn, passed in via `default_scope`).
pub fn resolve_input(
    spec: &InputSpec,
    ctx: &PatternContext,
    vault: &Vault,
    global_id: &str,
    pending: Option<&dyn PendingLookup>,
    buffers: &BufferStore,
    session_id: Option<&str>,
    default_scope: Scope,
) -> Result<ResolvedInput> {
    let resolved = match &spec.source {
        InputSource::Variable(name) => {
            resolve_variable_source(spec, name, buffers, session_id, default_scope)?
        }
        InputSource::File(pattern) => {
            resolve_file_source(spec, pattern, ctx, vault, global_id, pending)?
        }
    };

    if resolved.content.is_empty() && spec.required {
        return Err(EngineError::InputMissing(format!(
            "{}",
            match &spec.source {
                InputSource::File(p) => p.clone(),
                InputSource::Variable(v) => format!("variable:{v}"),
            }
        )));
    }

    Ok(resolved)
}

fn resolve_variable_source(
    spec: &InputSpec,
    name: &str,
    buffers: &BufferStore,
    session_id: Option<&str>,
    default_scope: Scope,
) -> Result<ResolvedInput> {
    let scope = spec.scope.unwrap_or(default_scope);
    let content = buffers
        .get(scope, session_id, name)
        .map(|b| b.content)
        .unwrap_or_default();
    let rendered = apply_modifiers(spec, &content, Some(name));
    Ok(ResolvedInput {
        content: rendered,
        source_paths: Vec::new(),
        used_pending: false,
    })
}

fn resolve_file_source(
    spec: &InputSpec,
    pattern: &str,
    ctx: &PatternContext,
    vault: &Vault,
    global_id: &str,
    pending: Option<&dyn PendingLookup>,
) -> Result<ResolvedInput> {
    let resolved = resolve_file_list(pattern, ctx, vault, global_id, pending)?;
    let mut rendered_blocks = Vec::with_capacity(resolved.paths.len());
    for relative in &resolved.paths {
        let absolute = vault.resolve(&relative.to_string_lossy())?;
        let raw = std::fs::read_to_string(&absolute)?;
        let label = relative.to_string_lossy().to_string();
        rendered_blocks.push(apply_modifiers(spec, &raw, Some(&label)));
    }
    Ok(ResolvedInput {
        content: rendered_blocks.join(JOIN_SEPARATOR),
        source_paths: resolved.paths,
        used_pending: resolved.used_pending,
    })
}

/// Apply `refs_only > properties > head` precedence to one file/variable's
/// raw content (spec.md §4.E). `label` is the reference label (file path or
/// variable name) this content came from — `refs_only` emits it verbatim,
/// and `properties` falls back to it when no frontmatter is present.
fn apply_modifiers(spec: &InputSpec, raw: &str, label: Option<&str>) -> String {
    if spec.refs_only {
        return label.unwrap_or_default().to_string();
    }
    if let Some(filter) = &spec.properties {
        return render_properties(raw, filter, label);
    }
    if let Some(n) = spec.head {
        return raw.lines().take(n).collect::<Vec<_>>().join("\n");
    }
    raw.to_string()
}

fn render_properties(raw: &str, filter: &PropertiesFilter, label: Option<&str>) -> String {
    let Ok((fm_text, _body)) = amd_directive::frontmatter::split_frontmatter(raw) else {
        return label.unwrap_or_default().to_string();
    };
    let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(&fm_text) else {
        return fm_text;
    };
    let serde_yaml::Value::Mapping(map) = value else {
        return fm_text;
    };
    let filtered: serde_yaml::Mapping = match filter {
        PropertiesFilter::All => map,
        PropertiesFilter::Keys(keys) => map
            .into_iter()
            .filter(|(k, _)| {
                k.as_str()
                    .map(|k| keys.iter().any(|wanted| wanted == k))
                    .unwrap_or(false)
            })
            .collect(),
    };
    serde_yaml::to_string(&serde_yaml::Value::Mapping(filtered)).unwrap_or_default()
}

/// Route a resolved input's text to its own `output=` destination, if any
/// (spec.md §4.E: inputs may fork a copy of what they read into a buffer or
/// file, independent of the step's own `@output`). Returns the resulting
/// manifest entry so the caller can splice its rendered summary into the
/// composed message in place of the raw content (spec.md §4.E step 4).
pub fn route_input_output(
    router: &Router,
    step_heading: &str,
    spec: &InputSpec,
    resolved: &ResolvedInput,
    session_id: Option<&str>,
) -> Result<Option<ManifestEntry>> {
    let Some(destination) = &spec.output else {
        return Ok(None);
    };
    let source_labels = input_source_labels(spec, resolved);
    let entry = router.route(
        step_heading,
        destination,
        &resolved.content,
        spec.write_mode,
        session_id,
        None,
        &source_labels,
    )?;
    Ok(Some(entry))
}

fn input_source_labels(spec: &InputSpec, resolved: &ResolvedInput) -> Vec<String> {
    match &spec.source {
        InputSource::Variable(name) => vec![name.clone()],
        InputSource::File(_) => resolved
            .source_paths
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amd_core::WeekDay;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn ctx() -> PatternContext {
        PatternContext::new(NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(), WeekDay::Monday)
    }

    fn spec(source: InputSource) -> InputSpec {
        InputSpec {
            source,
            required: false,
            refs_only: false,
            head: None,
            properties: None,
            output: None,
            write_mode: WriteMode::Append,
            scope: None,
        }
    }

    #[test]
    fn resolves_single_file_content() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "hello world").unwrap();
        let vault = Vault::new("v", tmp.path());
        let s = spec(InputSource::File("a.md".into()));
        let resolved =
            resolve_input(&s, &ctx(), &vault, "v/w", None, &BufferStore::new(), None, Scope::Run)
                .unwrap();
        assert_eq!(resolved.content, "hello world");
        assert_eq!(resolved.source_paths, vec![PathBuf::from("a.md")]);
    }

    #[test]
    fn required_input_with_no_matches_errors() {
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        let mut s = spec(InputSource::File("missing/*.md".into()));
        s.required = true;
        let err = resolve_input(&s, &ctx(), &vault, "v/w", None, &BufferStore::new(), None, Scope::Run)
            .unwrap_err();
        assert!(matches!(err, EngineError::InputMissing(_)));
    }

    #[test]
    fn refs_only_overrides_properties_and_head() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "line1\nline2\nline3").unwrap();
        let vault = Vault::new("v", tmp.path());
        let mut s = spec(InputSource::File("a.md".into()));
        s.refs_only = true;
        s.head = Some(1);
        let resolved =
            resolve_input(&s, &ctx(), &vault, "v/w", None, &BufferStore::new(), None, Scope::Run)
                .unwrap();
        assert_eq!(resolved.content, "a.md");
    }

    #[test]
    fn head_truncates_to_n_lines() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "line1\nline2\nline3").unwrap();
        let vault = Vault::new("v", tmp.path());
        let mut s = spec(InputSource::File("a.md".into()));
        s.head = Some(2);
        let resolved =
            resolve_input(&s, &ctx(), &vault, "v/w", None, &BufferStore::new(), None, Scope::Run)
                .unwrap();
        assert_eq!(resolved.content, "line1\nline2");
    }

    #[test]
    fn properties_filters_frontmatter_keys() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("a.md"),
            "---\ntitle: Hello\ntags: [a, b]\n---\nbody\n",
        )
        .unwrap();
        let vault = Vault::new("v", tmp.path());
        let mut s = spec(InputSource::File("a.md".into()));
        s.properties = Some(PropertiesFilter::Keys(vec!["title".into()]));
        let resolved =
            resolve_input(&s, &ctx(), &vault, "v/w", None, &BufferStore::new(), None, Scope::Run)
                .unwrap();
        assert!(resolved.content.contains("title"));
        assert!(!resolved.content.contains("tags"));
    }

    #[test]
    fn refs_only_on_a_variable_source_emits_the_variable_name() {
        let buffers = BufferStore::new();
        buffers
            .put(Scope::Run, None, "draft", "buffered text", amd_buffer::WriteMode::Replace, "s")
            .unwrap();
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        let mut s = spec(InputSource::Variable("draft".into()));
        s.refs_only = true;
        let resolved =
            resolve_input(&s, &ctx(), &vault, "v/w", None, &buffers, None, Scope::Run).unwrap();
        assert_eq!(resolved.content, "draft");
    }

    #[test]
    fn properties_without_frontmatter_falls_back_to_the_reference_label() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "no frontmatter here").unwrap();
        let vault = Vault::new("v", tmp.path());
        let mut s = spec(InputSource::File("a.md".into()));
        s.properties = Some(PropertiesFilter::All);
        let resolved =
            resolve_input(&s, &ctx(), &vault, "v/w", None, &BufferStore::new(), None, Scope::Run)
                .unwrap();
        assert_eq!(resolved.content, "a.md");
    }

    #[test]
    fn variable_source_reads_from_buffer_store() {
        let buffers = BufferStore::new();
        buffers
            .put(Scope::Run, None, "draft", "buffered text", amd_buffer::WriteMode::Replace, "s")
            .unwrap();
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        let s = spec(InputSource::Variable("draft".into()));
        let resolved =
            resolve_input(&s, &ctx(), &vault, "v/w", None, &buffers, None, Scope::Run).unwrap();
        assert_eq!(resolved.content, "buffered text");
    }
}
