//! File-list resolution: globs, `{latest[:N]}`, `{pending[:N]}` (spec.md
//! §4.A). Scalar (non-file-list) substitution is `substitute_scalar`.

use std::path::{Path, PathBuf};

use amd_core::{EngineError, Result, Vault};

use crate::tokens::{split_token_body, substitute_date_tokens, PatternContext};

/// A file-list selector recognized only at the final path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FinalSegment {
    Literal(String),
    Latest(usize),
    Pending(usize),
}

const DEFAULT_LATEST_N: usize = 1;
const DEFAULT_PENDING_N: usize = 10;

fn parse_final_segment(segment: &str) -> Result<FinalSegment> {
    if let Some(stripped) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        let (name, fmt) = split_token_body(stripped);
        match name {
            "latest" => {
                let n = parse_count(fmt, DEFAULT_LATEST_N)?;
                return Ok(FinalSegment::Latest(n));
            }
            "pending" => {
                let n = parse_count(fmt, DEFAULT_PENDING_N)?;
                return Ok(FinalSegment::Pending(n));
            }
            other => {
                return Err(EngineError::InvalidPattern(format!(
                    "unknown pattern token '{{{other}}}'"
                )));
            }
        }
    }
    Ok(FinalSegment::Literal(segment.to_string()))
}

fn parse_count(fmt: Option<&str>, default: usize) -> Result<usize> {
    match fmt {
        None => Ok(default),
        Some(n) => n
            .parse::<usize>()
            .map_err(|_| EngineError::InvalidPattern(format!("invalid count ':{n}'"))),
    }
}

/// Substitute date/time tokens in a directive value that is not a file
/// pattern (`@output file:`, `@header`, plain `@model` alias, etc). Errors
/// if an unrecognized `{...}` block remains — those are only valid in
/// file-list position.
pub fn substitute_scalar(value: &str, ctx: &PatternContext) -> Result<String> {
    let substituted = substitute_date_tokens(value, ctx)?;
    if let Some(start) = substituted.find('{') {
        let close = substituted[start..].find('}').map(|i| start + i);
        let token = match close {
            Some(end) => &substituted[start..=end],
            None => &substituted[start..],
        };
        return Err(EngineError::InvalidPattern(format!(
            "unknown pattern token '{token}' in '{value}'"
        )));
    }
    Ok(substituted)
}

/// Abstraction over the Pending State store so `amd-pattern` doesn't depend
/// on its concrete (persisted) implementation.
pub trait PendingLookup {
    /// Return the set of vault-relative paths already marked processed for
    /// `(global_id, pattern_string)`, along with whether each path's digest
    /// has changed since it was marked (changed ⇒ re-queue).
    fn is_processed(&self, global_id: &str, pattern_string: &str, path: &Path) -> bool;
}

/// A resolved file-list pattern.
#[derive(Debug, Clone)]
pub struct ResolvedFiles {
    /// Vault-relative paths, in selection order.
    pub paths: Vec<PathBuf>,
    pub used_pending: bool,
}

/// Resolve an `@input file:PATTERN` value to a concrete, ordered file list.
///
/// `global_id` and `pending` are only consulted when the pattern's final
/// segment is `{pending}`/`{pending:N}`.
pub fn resolve_file_list(
    pattern: &str,
    ctx: &PatternContext,
    vault: &Vault,
    global_id: &str,
    pending: Option<&dyn PendingLookup>,
) -> Result<ResolvedFiles> {
    if pattern.contains("**") {
        return Err(EngineError::InvalidPattern(format!(
            "'**' is forbidden in pattern '{pattern}'"
        )));
    }
    if pattern.contains("..") {
        return Err(EngineError::InvalidPattern(format!(
            "'..' is forbidden in pattern '{pattern}'"
        )));
    }

    let substituted = substitute_date_tokens(pattern, ctx)?;
    let (dir_part, final_raw) = match substituted.rsplit_once('/') {
        Some((dir, last)) => (dir, last),
        None => ("", substituted.as_str()),
    };
    let final_segment = parse_final_segment(final_raw)?;

    // Any brace token left in the directory part is unknown (date tokens
    // were already substituted above, and latest/pending are final-segment
    // only).
    if dir_part.contains('{') {
        return Err(EngineError::InvalidPattern(format!(
            "unknown pattern token in directory segment of '{pattern}'"
        )));
    }

    match final_segment {
        FinalSegment::Literal(literal) => {
            let full = if dir_part.is_empty() {
                literal
            } else {
                format!("{dir_part}/{literal}")
            };
            glob_vault(vault, &full)
        }
        FinalSegment::Latest(n) => {
            let mut entries = list_dir(vault, dir_part)?;
            sort_by_name_desc(&mut entries);
            entries.truncate(n);
            Ok(ResolvedFiles {
                paths: entries,
                used_pending: false,
            })
        }
        FinalSegment::Pending(n) => {
            let mut entries = list_dir(vault, dir_part)?;
            sort_by_name_desc(&mut entries);
            entries.reverse(); // oldest-by-name first, a stable queue order
            let filtered: Vec<PathBuf> = match pending {
                Some(lookup) => entries
                    .into_iter()
                    .filter(|relative| {
                        !lookup.is_processed(global_id, pattern, relative)
                    })
                    .collect(),
                None => entries,
            };
            let mut truncated = filtered;
            truncated.truncate(n);
            Ok(ResolvedFiles {
                paths: truncated,
                used_pending: true,
            })
        }
    }
}

fn glob_vault(vault: &Vault, pattern: &str) -> Result<ResolvedFiles> {
    let full_pattern = vault.root.join(pattern);
    let pattern_str = full_pattern.to_string_lossy().to_string();
    let mut paths = Vec::new();
    let entries = glob::glob(&pattern_str)
        .map_err(|e| EngineError::InvalidPattern(format!("bad glob '{pattern}': {e}")))?;
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => {
                if let Ok(relative) = path.strip_prefix(&vault.root) {
                    paths.push(relative.to_path_buf());
                }
            }
            Ok(_) => {}
            Err(_) => {}
        }
    }
    paths.sort();
    Ok(ResolvedFiles {
        paths,
        used_pending: false,
    })
}

fn list_dir(vault: &Vault, dir_part: &str) -> Result<Vec<PathBuf>> {
    let dir = if dir_part.is_empty() {
        vault.root.clone()
    } else {
        vault.resolve(dir_part)?
    };
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            if let Ok(relative) = path.strip_prefix(&vault.root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    Ok(out)
}

fn sort_by_name_desc(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
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

    struct NoopPending;
    impl PendingLookup for NoopPending {
        fn is_processed(&self, _g: &str, _p: &str, _path: &Path) -> bool {
            false
        }
    }

    #[test]
    fn latest_default_n_picks_most_recent() {
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        std::fs::create_dir_all(tmp.path().join("journal")).unwrap();
        for name in ["2026-02-08.md", "2026-02-09.md", "2026-02-10.md"] {
            std::fs::write(tmp.path().join("journal").join(name), "x").unwrap();
        }
        let resolved =
            resolve_file_list("journal/{latest}", &ctx(), &vault, "v/w", None).unwrap();
        assert_eq!(resolved.paths, vec![PathBuf::from("journal/2026-02-10.md")]);
    }

    #[test]
    fn latest_n_picks_top_n() {
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        std::fs::create_dir_all(tmp.path().join("journal")).unwrap();
        for name in ["2026-02-08.md", "2026-02-09.md", "2026-02-10.md"] {
            std::fs::write(tmp.path().join("journal").join(name), "x").unwrap();
        }
        let resolved =
            resolve_file_list("journal/{latest:2}", &ctx(), &vault, "v/w", None).unwrap();
        assert_eq!(
            resolved.paths,
            vec![
                PathBuf::from("journal/2026-02-10.md"),
                PathBuf::from("journal/2026-02-09.md")
            ]
        );
    }

    #[test]
    fn pending_filters_processed_paths() {
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        std::fs::create_dir_all(tmp.path().join("inbox")).unwrap();
        for name in ["a.md", "b.md", "c.md"] {
            std::fs::write(tmp.path().join("inbox").join(name), "x").unwrap();
        }
        struct Processed;
        impl PendingLookup for Processed {
            fn is_processed(&self, _g: &str, _p: &str, path: &Path) -> bool {
                path.ends_with("a.md")
            }
        }
        let resolved = resolve_file_list(
            "inbox/{pending}",
            &ctx(),
            &vault,
            "v/w",
            Some(&Processed),
        )
        .unwrap();
        assert_eq!(resolved.paths.len(), 2);
        assert!(resolved.used_pending);
        assert!(!resolved.paths.iter().any(|p| p.ends_with("a.md")));
    }

    #[test]
    fn forbidden_double_star_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        let err = resolve_file_list("**/x.md", &ctx(), &vault, "v/w", None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern(_)));
    }

    #[test]
    fn forbidden_parent_dir_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        let err = resolve_file_list("../x.md", &ctx(), &vault, "v/w", None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern(_)));
    }

    #[test]
    fn glob_matches_single_segment_wildcard() {
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        std::fs::create_dir_all(tmp.path().join("notes")).unwrap();
        std::fs::write(tmp.path().join("notes/a.md"), "x").unwrap();
        std::fs::write(tmp.path().join("notes/b.md"), "x").unwrap();
        let resolved = resolve_file_list("notes/*.md", &ctx(), &vault, "v/w", None).unwrap();
        assert_eq!(resolved.paths.len(), 2);
    }

    #[test]
    fn unknown_token_in_final_segment_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let vault = Vault::new("v", tmp.path());
        let err = resolve_file_list("notes/{bogus}", &ctx(), &vault, "v/w", Some(&NoopPending))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern(_)));
    }

    #[test]
    fn substitute_scalar_resolves_today_in_output_path() {
        let out = substitute_scalar("test/{today}", &ctx()).unwrap();
        assert_eq!(out, "test/2026-02-10");
    }

    #[test]
    fn substitute_scalar_errors_on_file_list_token() {
        let err = substitute_scalar("inbox/{pending:5}", &ctx()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern(_)));
    }
}
