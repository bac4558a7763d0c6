use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::message::Message;
use crate::core::transcription::TranscriptResult;

pub const TRIGGER_SUBMIT_MESSAGE: &str = "submit-message";

/// Body POSTed to the chat endpoint: the whole ordered conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub id: String,
    pub messages: Vec<Message>,
    pub trigger: String,
}

impl ChatRequest {
    /// Build a submit request from the history, dropping parts this client
    /// does not understand.
    pub fn submit(chat_id: impl Into<String>, history: &[Message]) -> Self {
        let messages = history
            .iter()
            .map(|message| Message {
                id: message.id.clone(),
                role: message.role,
                parts: message
                    .parts
                    .iter()
                    .filter(|part| !part.is_unknown())
                    .cloned()
                    .collect(),
            })
            .collect();
        Self {
            id: chat_id.into(),
            messages,
            trigger: TRIGGER_SUBMIT_MESSAGE.to_string(),
        }
    }
}

/// One `data:` payload of a UI-message stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiStreamChunk {
    TextStart {
        #[serde(default)]
        id: Option<String>,
    },
    TextDelta {
        #[serde(default)]
        id: Option<String>,
        delta: String,
    },
    TextEnd {
        #[serde(default)]
        id: Option<String>,
    },
    ReasoningStart {
        #[serde(default)]
        id: Option<String>,
    },
    ReasoningDelta {
        #[serde(default)]
        id: Option<String>,
        delta: String,
    },
    ReasoningEnd {
        #[serde(default)]
        id: Option<String>,
    },
    File {
        url: String,
        #[serde(rename = "mediaType")]
        media_type: String,
    },
    ToolInputStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    ToolInputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default)]
        input: Value,
    },
    ToolOutputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(default)]
        output: Value,
    },
    Finish,
    Abort,
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
    /// `start`, `start-step`, `finish-step`, `source-*`, `data-*`, metadata
    /// and anything newer.
    #[serde(other)]
    Other,
}

/// Success body of the transcription endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionResponse {
    pub transcription: TranscriptResult,
}

/// Failure body shared by both endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{MessagePart, Role};

    #[test]
    fn conversation_history_round_trips_with_part_order() {
        let history = vec![Message {
            id: "m1".into(),
            role: Role::User,
            parts: vec![
                MessagePart::text("what is in this picture?"),
                MessagePart::File {
                    media_type: "image/png".into(),
                    url: "data:image/png;base64,iVBORw0KGgo=".into(),
                    filename: Some("cat.png".into()),
                },
            ],
        }];
        let request = ChatRequest::submit("chat-1", &history);

        let encoded = serde_json::to_string(&request).expect("encode");
        let decoded: ChatRequest = serde_json::from_str(&encoded).expect("decode");

        assert_eq!(decoded, request);
        assert_eq!(decoded.messages, history);
        assert_eq!(decoded.trigger, "submit-message");
    }

    #[test]
    fn submit_drops_unknown_parts() {
        let history = vec![Message {
            id: "a1".into(),
            role: Role::Assistant,
            parts: vec![MessagePart::Unknown, MessagePart::text("kept")],
        }];
        let request = ChatRequest::submit("chat", &history);
        assert_eq!(request.messages[0].parts, vec![MessagePart::text("kept")]);
    }

    #[test]
    fn stream_chunks_decode_known_and_future_types() {
        let delta: UiStreamChunk =
            serde_json::from_str(r#"{"type":"text-delta","id":"t0","delta":"Hi"}"#)
                .expect("delta");
        assert_eq!(
            delta,
            UiStreamChunk::TextDelta {
                id: Some("t0".into()),
                delta: "Hi".into()
            }
        );

        let finish: UiStreamChunk =
            serde_json::from_str(r#"{"type":"finish","finishReason":"stop"}"#).expect("finish");
        assert_eq!(finish, UiStreamChunk::Finish);

        let future: UiStreamChunk =
            serde_json::from_str(r#"{"type":"data-weather","data":{"temp":3}}"#)
                .expect("future");
        assert_eq!(future, UiStreamChunk::Other);
    }
}
