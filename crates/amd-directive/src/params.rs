//! Parser for the `(k=v, flag, k="v,w")` parameter list that follows a
//! directive's value.

use amd_core::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Flag(String),
    KeyValue(String, String),
}

/// A parsed parameter list, preserving source order but offering
/// convenience lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamList(pub Vec<Param>);

impl ParamList {
    pub fn has_flag(&self, name: &str) -> bool {
        self.0.iter().any(|p| match p {
            Param::Flag(f) => f == name,
            Param::KeyValue(k, v) => k == name && (v == "true" || v.is_empty()),
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find_map(|p| match p {
            Param::KeyValue(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }
}

/// Split a directive's raw tail into `(value, params)`. The tail is
/// everything after `@name` (and an optional `:`), up to end of line. A
/// trailing, *balanced* `(...)` group — not nested — is parsed as the
/// parameter list; anything before it is the value.
pub fn split_value_and_params(tail: &str, line_no: usize) -> Result<(String, ParamList)> {
    let trimmed = tail.trim();
    if let Some(open) = trimmed.rfind('(') {
        if trimmed.ends_with(')') {
            let value = trimmed[..open].trim().to_string();
            let params_str = &trimmed[open + 1..trimmed.len() - 1];
            let params = parse_param_list(params_str, line_no)?;
            return Ok((value, params));
        }
    }
    Ok((trimmed.to_string(), ParamList::default()))
}

fn parse_param_list(raw: &str, line_no: usize) -> Result<ParamList> {
    let mut params = Vec::new();
    for chunk in split_top_level_commas(raw) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        if let Some((key, value)) = chunk.split_once('=') {
            let key = key.trim().to_string();
            let mut value = value.trim().to_string();
            if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
                value = value[1..value.len() - 1].to_string();
            }
            if key.is_empty() {
                return Err(EngineError::DirectiveParseError {
                    line: line_no,
                    name: "(params)".into(),
                    reason: format!("empty parameter key in '{chunk}'"),
                });
            }
            params.push(Param::KeyValue(key, value));
        } else {
            params.push(Param::Flag(chunk.to_string()));
        }
    }
    Ok(ParamList(params))
}

/// Split on commas that are not inside a double-quoted string, so
/// `properties="K1,K2"` survives as one chunk.
fn split_top_level_commas(raw: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                chunks.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_value_and_flag_params() {
        let (value, params) = split_value_and_params("file: inbox/{pending:5} (required)", 1).unwrap();
        assert_eq!(value, "file: inbox/{pending:5}");
        assert!(params.has_flag("required"));
    }

    #[test]
    fn splits_value_and_keyvalue_params() {
        let (value, params) =
            split_value_and_params("file:notes/a.md (output=variable:foo, write_mode=append)", 1)
                .unwrap();
        assert_eq!(value, "file:notes/a.md");
        assert_eq!(params.get("output"), Some("variable:foo"));
        assert_eq!(params.get("write_mode"), Some("append"));
    }

    #[test]
    fn quoted_value_preserves_commas() {
        let (value, params) =
            split_value_and_params("file:a.md (properties=\"K1,K2\")", 1).unwrap();
        assert_eq!(value, "file:a.md");
        assert_eq!(params.get("properties"), Some("K1,K2"));
    }

    #[test]
    fn no_params_when_no_trailing_parens() {
        let (value, params) = split_value_and_params("gpt-mini", 1).unwrap();
        assert_eq!(value, "gpt-mini");
        assert!(params.0.is_empty());
    }

    #[test]
    fn empty_key_is_parse_error() {
        let err = split_value_and_params("file:a.md (=bad)", 1).unwrap_err();
        assert!(matches!(err, EngineError::DirectiveParseError { .. }));
    }
}
