pub mod attachments;
pub mod chat_stream;
pub mod config;
pub mod constants;
pub mod error;
pub mod message;
pub mod session;
pub mod transcription;
