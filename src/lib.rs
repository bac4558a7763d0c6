//! Parlance is a terminal client for chat endpoints that stream their replies
//! as UI-message events, with image attachments and audio transcription.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation model, the chat session state machine,
//!   attachment staging, the streaming transport, and the transcription
//!   client.
//! - [`api`] defines the request and response payloads exchanged with the
//!   chat and transcription endpoints.
//! - [`cli`] parses arguments and drives sessions from the terminal.
//! - [`utils`] holds URL joining, id generation, media-type lookup, and
//!   tracing setup.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
