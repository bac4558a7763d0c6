//! Error taxonomy shared by the session, transport, and transcription layers.
//!
//! Validation failures are raised before any network call and never change
//! session state. Transport failures land in the session's `error` slot with
//! partial assistant content preserved. Transcription failures are returned
//! to the caller of `transcribe` and leave nothing behind.

use std::error::Error as StdError;
use std::fmt;

use crate::core::session::ChatStatus;

/// Input rejected before any request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Neither text nor attachments were supplied.
    EmptyMessage,
    /// Staging the selection would exceed the attachment limit.
    TooManyAttachments {
        pending: usize,
        adding: usize,
        max: usize,
    },
    /// `remove` was called with a position outside the pending set.
    AttachmentIndexOutOfRange { index: usize, len: usize },
    /// Transcription was requested without an audio file.
    MissingAudio,
    /// The audio file has no bytes.
    EmptyAudio { name: String },
    /// The selected file is not an audio file.
    NotAudio { name: String, media_type: String },
    /// More than one audio file was selected for transcription.
    TooManyAudioFiles(usize),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyMessage => {
                write!(f, "Message must contain text or at least one attachment")
            }
            ValidationError::TooManyAttachments { max, .. } => {
                write!(f, "You can only upload up to {max} files.")
            }
            ValidationError::AttachmentIndexOutOfRange { index, len } => {
                write!(f, "No attachment at position {index} ({len} pending)")
            }
            ValidationError::MissingAudio => write!(f, "Audio file is required"),
            ValidationError::EmptyAudio { name } => write!(f, "Audio file '{name}' is empty"),
            ValidationError::NotAudio { name, media_type } => {
                write!(f, "'{name}' is not an audio file ({media_type})")
            }
            ValidationError::TooManyAudioFiles(_) => {
                write!(f, "You can only upload one audio file.")
            }
        }
    }
}

impl StdError for ValidationError {}

/// Failure while opening or consuming a chat response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a response (connect, TLS, reset, timeout).
    Network(String),
    /// The endpoint answered with a non-2xx status.
    Status { status: u16, message: String },
    /// A stream frame could not be decoded.
    Decode(String),
    /// The endpoint reported an error inside the stream.
    Stream(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(message) => write!(f, "Network error: {message}"),
            TransportError::Status { status, message } => {
                write!(f, "Request failed with status {status}: {message}")
            }
            TransportError::Decode(message) => write!(f, "Malformed stream frame: {message}"),
            TransportError::Stream(message) => write!(f, "{message}"),
        }
    }
}

impl StdError for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network(err.to_string())
    }
}

/// Reasons a `send_message` call is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    Validation(ValidationError),
    /// A request is already in flight.
    Busy(ChatStatus),
    /// A staged attachment could not be read at send time.
    AttachmentRead { name: String, message: String },
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Validation(err) => write!(f, "{err}"),
            SendError::Busy(status) => write!(
                f,
                "A response is still in progress ({}); stop it before sending again",
                status.as_str()
            ),
            SendError::AttachmentRead { name, message } => {
                write!(f, "Failed to read attachment '{name}': {message}")
            }
        }
    }
}

impl StdError for SendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SendError::Validation(err) => Some(err),
            SendError::Busy(_) | SendError::AttachmentRead { .. } => None,
        }
    }
}

impl From<ValidationError> for SendError {
    fn from(err: ValidationError) -> Self {
        SendError::Validation(err)
    }
}

/// A status change outside the session transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ChatStatus,
    pub to: ChatStatus,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid session transition: {} -> {}",
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl StdError for InvalidTransition {}

/// Failure of a single transcription call.
#[derive(Debug)]
pub enum TranscriptionError {
    Validation(ValidationError),
    /// Reading the staged audio file failed.
    Io(std::io::Error),
    Network(reqwest::Error),
    /// The endpoint answered with a non-2xx status.
    Status { status: u16, message: String },
    /// The success body did not contain a transcript.
    Decode(String),
}

impl fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptionError::Validation(err) => write!(f, "{err}"),
            TranscriptionError::Io(err) => write!(f, "Failed to read audio file: {err}"),
            TranscriptionError::Network(err) => write!(f, "Network error: {err}"),
            TranscriptionError::Status { message, .. } => write!(f, "{message}"),
            TranscriptionError::Decode(message) => {
                write!(f, "Failed to decode transcription response: {message}")
            }
        }
    }
}

impl StdError for TranscriptionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TranscriptionError::Validation(err) => Some(err),
            TranscriptionError::Io(err) => Some(err),
            TranscriptionError::Network(err) => Some(err),
            TranscriptionError::Status { .. } | TranscriptionError::Decode(_) => None,
        }
    }
}

impl From<ValidationError> for TranscriptionError {
    fn from(err: ValidationError) -> Self {
        TranscriptionError::Validation(err)
    }
}

impl From<reqwest::Error> for TranscriptionError {
    fn from(err: reqwest::Error) -> Self {
        TranscriptionError::Network(err)
    }
}

impl From<std::io::Error> for TranscriptionError {
    fn from(err: std::io::Error) -> Self {
        TranscriptionError::Io(err)
    }
}

/// Reduce an error response body to the message a user should see.
///
/// Recognizes `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"message": "..."}`; any other body is returned trimmed, verbatim.
pub fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<no body>".to_string();
    }

    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .filter(|summary| !summary.is_empty())
        .unwrap_or_else(|| trimmed.to_string())
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}
