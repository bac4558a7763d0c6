//! Shared constants used across the client

/// Maximum number of attachments that may be pending on one outgoing message.
pub const MAX_ATTACHMENTS: usize = 5;

/// Multipart field name the transcription endpoint reads the audio file from.
pub const AUDIO_FIELD: &str = "audio";

/// Terminator payload sent by UI-message streams after the last chunk.
pub const STREAM_DONE_SENTINEL: &str = "[DONE]";

/// Header that announces the UI-message stream protocol version.
pub const UI_MESSAGE_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";
