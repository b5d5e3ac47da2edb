//! Uniform tool return shape (Design Notes §9: "define a sum type and route
//! uniformly via the Router").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolResult {
    Text(String),
    Structured(serde_json::Value),
    Multimodal(Vec<ToolPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolPart {
    Text(String),
    /// A reference to out-of-band binary content (e.g. an image); the
    /// engine never inlines raw bytes into a prompt.
    Reference { label: String, mime_type: String },
}

impl ToolResult {
    /// Render to a string payload suitable for routing/inlining. Structured
    /// results are pretty-printed JSON; multimodal results concatenate text
    /// parts and describe references by label.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
            Self::Multimodal(parts) => parts
                .iter()
                .map(|p| match p {
                    ToolPart::Text(s) => s.clone(),
                    ToolPart::Reference { label, mime_type } => {
                        format!("[{mime_type} reference: {label}]")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_result_as_text_is_identity() {
        let result = ToolResult::Text("hello".into());
        assert_eq!(result.as_text(), "hello");
    }

    #[test]
    fn multimodal_result_describes_references() {
        let result = ToolResult::Multimodal(vec![
            ToolPart::Text("see:".into()),
            ToolPart::Reference {
                label: "chart.png".into(),
                mime_type: "image/png".into(),
            },
        ]);
        assert_eq!(result.as_text(), "see:\n[image/png reference: chart.png]");
    }
}
