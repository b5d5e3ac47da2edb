//! Date/time token substitution for directive values (spec.md §4.A).

use amd_core::{EngineError, Result, WeekDay};
use chrono::{Datelike, Duration, NaiveDate};

/// Context the resolver needs to render date/time tokens deterministically.
#[derive(Debug, Clone)]
pub struct PatternContext {
    /// "Now", already localized to the runtime's configured timezone.
    pub today: NaiveDate,
    pub week_start_day: WeekDay,
}

impl PatternContext {
    pub fn new(today: NaiveDate, week_start_day: WeekDay) -> Self {
        Self {
            today,
            week_start_day,
        }
    }
}

/// Format tokens, longest-match-first so `YYYY` isn't eaten as `YY` + `YY`.
const FORMAT_TOKENS: &[&str] = &[
    "YYYY", "MMMM", "dddd", "MMM", "ddd", "YY", "MM", "DD", "HH", "mm", "ss", "M", "D",
];

fn format_date(date: NaiveDate, fmt: &str) -> String {
    let mut out = String::with_capacity(fmt.len());
    let chars: Vec<char> = fmt.chars().collect();
    let mut i = 0;
    'outer: while i < chars.len() {
        for token in FORMAT_TOKENS {
            let tlen = token.chars().count();
            if i + tlen <= chars.len() {
                let slice: String = chars[i..i + tlen].iter().collect();
                if &slice == token {
                    out.push_str(&render_token(date, token));
                    i += tlen;
                    continue 'outer;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn render_token(date: NaiveDate, token: &str) -> String {
    match token {
        "YYYY" => format!("{:04}", date.year()),
        "YY" => format!("{:02}", date.year().rem_euclid(100)),
        "MM" => format!("{:02}", date.month()),
        "M" => format!("{}", date.month()),
        "DD" => format!("{:02}", date.day()),
        "D" => format!("{}", date.day()),
        "MMMM" => date.format("%B").to_string(),
        "MMM" => date.format("%b").to_string(),
        "dddd" => date.format("%A").to_string(),
        "ddd" => date.format("%a").to_string(),
        "HH" => "00".to_string(),
        "mm" => "00".to_string(),
        "ss" => "00".to_string(),
        _ => String::new(),
    }
}

fn week_start(ctx: &PatternContext, date: NaiveDate) -> NaiveDate {
    week_start_of(date, ctx.week_start_day)
}

/// Start-of-week date containing `date`, given a `week_start_day` — the
/// same computation `{this-week}` uses, exposed for callers (the cache
/// store's weekly validity window) that need it outside a full
/// [`PatternContext`] substitution pass.
pub fn week_start_of(date: NaiveDate, week_start_day: WeekDay) -> NaiveDate {
    let today_idx = WeekDay::from_chrono(date.weekday()).index_from_monday();
    let start_idx = week_start_day.index_from_monday();
    let back = (today_idx - start_idx).rem_euclid(7);
    date - Duration::days(back)
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Resolve one date/time token (without braces), e.g. `today` or
/// `this-week:MMM DD`. Returns `None` if `name` is not a recognized date
/// token (used by the resolver to detect file-list-only tokens like
/// `latest`/`pending`).
pub fn resolve_date_token(name: &str, format: Option<&str>, ctx: &PatternContext) -> Option<String> {
    let date = match name {
        "today" => ctx.today,
        "yesterday" => ctx.today - Duration::days(1),
        "tomorrow" => ctx.today + Duration::days(1),
        "this-week" => week_start(ctx, ctx.today),
        "last-week" => week_start(ctx, ctx.today) - Duration::days(7),
        "next-week" => week_start(ctx, ctx.today) + Duration::days(7),
        "this-month" => month_start(ctx.today),
        "last-month" => {
            let start = month_start(ctx.today);
            let prev_last_day = start - Duration::days(1);
            month_start(prev_last_day)
        }
        "day-name" => {
            return Some(match format {
                Some(fmt) => format_date(ctx.today, fmt),
                None => ctx.today.format("%A").to_string(),
            });
        }
        "month-name" => {
            return Some(match format {
                Some(fmt) => format_date(ctx.today, fmt),
                None => ctx.today.format("%B").to_string(),
            });
        }
        _ => return None,
    };
    Some(match format {
        Some(fmt) => format_date(date, fmt),
        None => format_date(date, "YYYY-MM-DD"),
    })
}

/// Split a brace token body `name` or `name:FORMAT` into its parts.
pub fn split_token_body(body: &str) -> (&str, Option<&str>) {
    match body.split_once(':') {
        Some((name, fmt)) => (name, Some(fmt)),
        None => (body, None),
    }
}

/// Substitute every `{...}` occurrence in `value` that names a recognized
/// date/time token, leaving any other brace block untouched (the caller
/// decides whether a leftover block is a file-list token or an error).
pub fn substitute_date_tokens(value: &str, ctx: &PatternContext) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    loop {
        match rest.find('{') {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start + 1..];
                match after_open.find('}') {
                    None => {
                        return Err(EngineError::InvalidPattern(format!(
                            "unclosed '{{' in pattern '{value}'"
                        )));
                    }
                    Some(end) => {
                        let body = &after_open[..end];
                        let (name, fmt) = split_token_body(body);
                        match resolve_date_token(name, fmt, ctx) {
                            Some(rendered) => out.push_str(&rendered),
                            None => {
                                // Not a date token — leave it verbatim for
                                // the file-list resolver (or surface as
                                // InvalidPattern there if still unknown).
                                out.push('{');
                                out.push_str(body);
                                out.push('}');
                            }
                        }
                        rest = &after_open[end + 1..];
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PatternContext {
        // 2026-02-10 is a Tuesday.
        PatternContext::new(NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(), WeekDay::Monday)
    }

    #[test]
    fn today_default_format() {
        assert_eq!(
            resolve_date_token("today", None, &ctx()),
            Some("2026-02-10".to_string())
        );
    }

    #[test]
    fn yesterday_and_tomorrow() {
        assert_eq!(
            resolve_date_token("yesterday", None, &ctx()),
            Some("2026-02-09".to_string())
        );
        assert_eq!(
            resolve_date_token("tomorrow", None, &ctx()),
            Some("2026-02-11".to_string())
        );
    }

    #[test]
    fn this_week_respects_week_start_day() {
        // Monday-start week containing Tue 2026-02-10 starts 2026-02-09.
        assert_eq!(
            resolve_date_token("this-week", None, &ctx()),
            Some("2026-02-09".to_string())
        );
    }

    #[test]
    fn custom_format_token() {
        assert_eq!(
            resolve_date_token("today", Some("MMM DD, YYYY"), &ctx()),
            Some("Feb 10, 2026".to_string())
        );
    }

    #[test]
    fn day_name_and_month_name() {
        assert_eq!(
            resolve_date_token("day-name", None, &ctx()),
            Some("Tuesday".to_string())
        );
        assert_eq!(
            resolve_date_token("month-name", None, &ctx()),
            Some("February".to_string())
        );
    }

    #[test]
    fn substitute_leaves_unknown_braces_for_caller() {
        let out = substitute_date_tokens("inbox/{pending:5}", &ctx()).unwrap();
        assert_eq!(out, "inbox/{pending:5}");
    }

    #[test]
    fn substitute_handles_multiple_tokens() {
        let out = substitute_date_tokens("notes/{today}/{day-name}.md", &ctx()).unwrap();
        assert_eq!(out, "notes/2026-02-10/Tuesday.md");
    }

    #[test]
    fn unclosed_brace_is_invalid_pattern() {
        let err = substitute_date_tokens("notes/{today", &ctx()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern(_)));
    }
}
