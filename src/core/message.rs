use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::utils::ids::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

const TOOL_TYPE_PREFIX: &str = "tool-";
const TOOL_OUTPUT_AVAILABLE: &str = "output-available";

/// One typed unit of message content.
///
/// On the wire a tool result is a `tool-<name>` part in the
/// `output-available` state. Unrecognized `type` tags, and tool parts in any
/// other state, decode to [`MessagePart::Unknown`], which every consumer
/// treats as a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum MessagePart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    File {
        media_type: String,
        url: String,
        filename: Option<String>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        output: Value,
    },
    Unknown,
}

impl From<MessagePart> for Value {
    fn from(part: MessagePart) -> Self {
        match part {
            MessagePart::Text { text } => json!({"type": "text", "text": text}),
            MessagePart::Reasoning { text } => json!({"type": "reasoning", "text": text}),
            MessagePart::File {
                media_type,
                url,
                filename,
            } => {
                let mut value = json!({"type": "file", "mediaType": media_type, "url": url});
                if let Some(filename) = filename {
                    value["filename"] = Value::String(filename);
                }
                value
            }
            MessagePart::ToolResult {
                tool_call_id,
                tool_name,
                input,
                output,
            } => json!({
                "type": format!("{TOOL_TYPE_PREFIX}{tool_name}"),
                "toolCallId": tool_call_id,
                "state": TOOL_OUTPUT_AVAILABLE,
                "input": input,
                "output": output,
            }),
            MessagePart::Unknown => json!({"type": "unknown"}),
        }
    }
}

impl TryFrom<Value> for MessagePart {
    type Error = String;

    fn try_from(mut value: Value) -> Result<Self, Self::Error> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| "message part without a type".to_string())?
            .to_string();

        match kind.as_str() {
            "text" => Ok(MessagePart::Text {
                text: string_field(&value, &kind, "text")?,
            }),
            "reasoning" => Ok(MessagePart::Reasoning {
                text: string_field(&value, &kind, "text")?,
            }),
            "file" => Ok(MessagePart::File {
                media_type: string_field(&value, &kind, "mediaType")?,
                url: string_field(&value, &kind, "url")?,
                filename: value
                    .get("filename")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            _ => Ok(tool_result(&kind, &mut value).unwrap_or(MessagePart::Unknown)),
        }
    }
}

fn string_field(value: &Value, kind: &str, field: &str) -> Result<String, String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("{kind} part is missing string field `{field}`"))
}

fn tool_result(kind: &str, value: &mut Value) -> Option<MessagePart> {
    let tool_name = kind.strip_prefix(TOOL_TYPE_PREFIX)?.to_string();
    if value.get("state").and_then(Value::as_str) != Some(TOOL_OUTPUT_AVAILABLE) {
        return None;
    }
    Some(MessagePart::ToolResult {
        tool_call_id: value.get("toolCallId")?.as_str()?.to_string(),
        tool_name,
        input: value.get_mut("input").map(Value::take).unwrap_or_default(),
        output: value.get_mut("output").map(Value::take).unwrap_or_default(),
    })
}

/// Discriminator of a [`MessagePart`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Text,
    Reasoning,
    File,
    ToolResult,
    Unknown,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }

    pub fn file(media_type: impl Into<String>, url: impl Into<String>) -> Self {
        MessagePart::File {
            media_type: media_type.into(),
            url: url.into(),
            filename: None,
        }
    }

    pub fn kind(&self) -> PartKind {
        match self {
            MessagePart::Text { .. } => PartKind::Text,
            MessagePart::Reasoning { .. } => PartKind::Reasoning,
            MessagePart::File { .. } => PartKind::File,
            MessagePart::ToolResult { .. } => PartKind::ToolResult,
            MessagePart::Unknown => PartKind::Unknown,
        }
    }

    /// Text carried by a text or reasoning part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePart::Text { text } | MessagePart::Reasoning { text } => Some(text),
            _ => None,
        }
    }

    /// Extend a streamed text or reasoning part. Other parts are immutable and
    /// report `false`.
    pub(crate) fn append(&mut self, fragment: &str) -> bool {
        match self {
            MessagePart::Text { text } | MessagePart::Reasoning { text } => {
                text.push_str(fragment);
                true
            }
            _ => false,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, MessagePart::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            id: generate_id(),
            role,
            parts,
        }
    }

    pub fn user(parts: Vec<MessagePart>) -> Self {
        Self::new(Role::User, parts)
    }

    pub fn assistant_placeholder() -> Self {
        Self::new(Role::Assistant, Vec::new())
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Concatenated text of every text part, in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}
