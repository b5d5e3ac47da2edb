//! A. Pattern Resolver (spec.md §4.A): substitutes `{today}`-style tokens,
//! `{latest[:N]}`, `{pending[:N]}`, and single-segment globs into directive
//! values.

pub mod resolver;
pub mod tokens;

pub use resolver::{resolve_file_list, substitute_scalar, PendingLookup, ResolvedFiles};
pub use tokens::{week_start_of, PatternContext};
