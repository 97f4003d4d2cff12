//! Message parts and the transcript text extractor.
//!
//! The server stores every message as an ordered list of typed parts. Only
//! `text` parts carry prose worth showing in a transcript; tool traffic,
//! reasoning and file attachments are kept as structured data and skipped by
//! [`extract_text`].

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// One fragment of a message, discriminated by its wire `type`.
///
/// Deserialization is total: any JSON value becomes a `Part`, with
/// unrecognised or malformed fragments landing in [`Part::Unknown`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum Part {
    Text {
        text: Option<String>,
        content: Option<String>,
    },
    ToolInvocation(Value),
    ToolResult(Value),
    Tool(Value),
    Reasoning,
    File,
    StepStart,
    StepFinish,
    Unknown(String),
}

impl Part {
    /// Builds an outgoing text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: Some(text.into()),
            content: None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolInvocation(_) => "tool-invocation",
            Self::ToolResult(_) => "tool-result",
            Self::Tool(_) => "tool",
            Self::Reasoning => "reasoning",
            Self::File => "file",
            Self::StepStart => "step-start",
            Self::StepFinish => "step-finish",
            Self::Unknown(kind) => kind,
        }
    }

    /// Text this part contributes to a transcript; empty for non-text kinds.
    pub fn visible_text(&self) -> &str {
        match self {
            Self::Text { text, content } => text
                .as_deref()
                .or(content.as_deref())
                .unwrap_or_default(),
            _ => "",
        }
    }
}

impl From<Value> for Part {
    fn from(value: Value) -> Self {
        let Value::Object(fields) = value else {
            return Self::Unknown(String::new());
        };
        let kind = fields
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match kind.as_str() {
            "text" => Self::Text {
                text: string_field(&fields, "text"),
                content: string_field(&fields, "content"),
            },
            "tool-invocation" => Self::ToolInvocation(Value::Object(fields)),
            "tool-result" => Self::ToolResult(Value::Object(fields)),
            "tool" => Self::Tool(Value::Object(fields)),
            "reasoning" => Self::Reasoning,
            "file" => Self::File,
            "step-start" => Self::StepStart,
            "step-finish" => Self::StepFinish,
            _ => Self::Unknown(kind),
        }
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Outgoing parts are always text; anything else is never sent by this client.
impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(rename = "type")]
            kind: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            text: Option<&'a str>,
        }

        let text = match self {
            Self::Text { .. } => Some(self.visible_text()),
            _ => None,
        };
        Wire {
            kind: self.kind(),
            text,
        }
        .serialize(serializer)
    }
}

/// Flattens a message's parts into display text.
///
/// Non-empty text contributions are joined with a single newline; every other
/// part contributes nothing.
pub fn extract_text(parts: &[Part]) -> String {
    parts
        .iter()
        .map(Part::visible_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
