//! Incremental rendering of the assistant reply to a terminal.

use std::io::{self, Write};

use crate::core::message::{Message, MessagePart};
use crate::core::session::ChatSession;

/// Writes only the text the reply gained since the previous update.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    message_id: Option<String>,
    printed: usize,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of the in-progress reply not yet written. Non-text parts are
    /// announced once, as they arrive.
    pub fn pending_output(&mut self, session: &ChatSession) -> Option<String> {
        let message = session.messages().last().filter(|m| m.is_assistant())?;
        if self.message_id.as_deref() != Some(message.id.as_str()) {
            self.message_id = Some(message.id.clone());
            self.printed = 0;
        }

        let rendered = render_reply(message);
        let fresh = rendered.get(self.printed..).filter(|s| !s.is_empty())?;
        self.printed = rendered.len();
        Some(fresh.to_string())
    }

    pub fn update(&mut self, session: &ChatSession) {
        if let Some(fresh) = self.pending_output(session) {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(fresh.as_bytes());
            let _ = stdout.flush();
        }
    }
}

fn render_reply(message: &Message) -> String {
    let mut out = String::new();
    for part in &message.parts {
        match part {
            MessagePart::Text { text } => out.push_str(text),
            MessagePart::File { media_type, .. } => {
                out.push_str(&format!("[file: {media_type}]\n"));
            }
            MessagePart::ToolResult { tool_name, .. } => {
                out.push_str(&format!("[tool result: {tool_name}]\n"));
            }
            MessagePart::Reasoning { .. } | MessagePart::Unknown => {}
        }
    }
    out
}
