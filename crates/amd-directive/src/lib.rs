//! B. Directive Parser (spec.md §4.B): frontmatter + `@directive value
//! (params)` grammar, producing one typed AST for both the Loader and the
//! Step Engine.

pub mod directives;
pub mod document;
pub mod frontmatter;
pub mod params;

pub use directives::{
    CacheSpec, InputSource, InputSpec, ModelSpec, OutputSpec, PropertiesFilter, RecentSpec,
    ToolSpec,
};
pub use document::{parse_document, Document, Section};
pub use frontmatter::{Frontmatter, PassthroughRuns, ScheduleSpec};
pub use params::{Param, ParamList};
