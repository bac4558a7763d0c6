//! Streaming transport between a chat session and the inference endpoint.
//!
//! [`Transport::open`] starts a request carrying the full conversation and
//! hands back a [`StreamHandle`]: a finite, non-restartable sequence of
//! [`Fragment`]s. The HTTP implementation runs the request on a spawned task
//! and forwards decoded fragments over a channel, racing the whole exchange
//! against the request's cancellation token.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use futures_util::StreamExt;
use memchr::memchr;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ChatRequest, UiStreamChunk};
use crate::core::constants::{STREAM_DONE_SENTINEL, UI_MESSAGE_STREAM_HEADER};
use crate::core::error::{summarize_error_body, TransportError};

/// Part kinds that are opened, extended by deltas, then closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamedPart {
    Text,
    Reasoning,
}

/// Kind of part announced by a [`Fragment::PartStart`]. File and tool-result
/// parts arrive complete.
#[derive(Debug, Clone, PartialEq)]
pub enum PartStart {
    Text,
    Reasoning,
    File {
        media_type: String,
        url: String,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Value,
        output: serde_json::Value,
    },
}

/// One incremental unit of a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    TextDelta(String),
    ReasoningDelta(String),
    PartStart(PartStart),
    PartEnd(StreamedPart),
    Done,
    Failure(TransportError),
}

impl Fragment {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Fragment::Done | Fragment::Failure(_))
    }
}

/// Producer side of a [`StreamHandle`].
#[derive(Clone)]
pub struct FragmentSink {
    tx: mpsc::UnboundedSender<Fragment>,
}

impl FragmentSink {
    /// Returns `false` once the handle has been dropped.
    pub fn send(&self, fragment: Fragment) -> bool {
        self.tx.send(fragment).is_ok()
    }
}

/// Consumer side of one open request.
///
/// The sequence ends after the first terminal fragment, when the producer
/// goes away, or as soon as the request is cancelled. A cancelled handle never
/// yields `Done`.
pub struct StreamHandle {
    rx: mpsc::UnboundedReceiver<Fragment>,
    cancel: CancellationToken,
    finished: bool,
}

impl StreamHandle {
    pub fn channel(cancel: CancellationToken) -> (FragmentSink, StreamHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            FragmentSink { tx },
            StreamHandle {
                rx,
                cancel,
                finished: false,
            },
        )
    }

    pub async fn next(&mut self) -> Option<Fragment> {
        if self.finished || self.cancel.is_cancelled() {
            self.close();
            return None;
        }

        let fragment = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            fragment = self.rx.recv() => fragment,
        };

        match &fragment {
            Some(f) if f.is_terminal() => self.finished = true,
            Some(_) => {}
            None => self.close(),
        }
        fragment
    }

    /// Stop consuming. Fragments already queued are discarded.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn close(&mut self) {
        self.finished = true;
        self.rx.close();
    }
}

/// Capability to send a conversation and receive an incremental response.
pub trait Transport: Send + Sync {
    /// Begin a request. Must be called from within a Tokio runtime when the
    /// implementation performs I/O.
    fn open(&self, request: ChatRequest, cancel: CancellationToken) -> StreamHandle;
}

/// Framing used by the chat endpoint's response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamProtocol {
    /// Server-sent `data:` lines carrying typed JSON chunks.
    #[default]
    UiMessage,
    /// Raw UTF-8 text; every chunk is a text delta.
    Text,
}

impl StreamProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamProtocol::UiMessage => "ui-message",
            StreamProtocol::Text => "text",
        }
    }
}

impl fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamProtocol {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ui-message" | "ui_message" | "sse" => Ok(StreamProtocol::UiMessage),
            "text" => Ok(StreamProtocol::Text),
            other => Err(format!("Unsupported stream protocol: {other}")),
        }
    }
}

/// Splits a byte stream into trimmed, non-empty lines.
#[derive(Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, TransportError>> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(decoded) = decode_line(&line[..newline_pos]) {
                lines.push(decoded);
            }
        }
        lines
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Result<String, TransportError>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(bytes: &[u8]) -> Option<Result<String, TransportError>> {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| Ok(trimmed.to_string()))
        }
        Err(err) => Some(Err(TransportError::Decode(format!(
            "invalid UTF-8 in stream: {err}"
        )))),
    }
}

/// Maps UI-message stream lines to fragments.
///
/// Tool names and inputs arrive on `tool-input-*` chunks and are remembered
/// so the later `tool-output-available` chunk becomes a complete part.
#[derive(Default)]
pub struct UiMessageDecoder {
    tool_calls: HashMap<String, (String, serde_json::Value)>,
}

impl UiMessageDecoder {
    pub fn decode_line(&mut self, line: &str) -> Vec<Fragment> {
        let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
            return Vec::new();
        };
        if payload.is_empty() {
            return Vec::new();
        }
        if payload == STREAM_DONE_SENTINEL {
            return vec![Fragment::Done];
        }

        match serde_json::from_str::<UiStreamChunk>(payload) {
            Ok(chunk) => self.fragments_for(chunk),
            Err(err) => vec![Fragment::Failure(TransportError::Decode(format!(
                "{err}: {payload}"
            )))],
        }
    }

    fn fragments_for(&mut self, chunk: UiStreamChunk) -> Vec<Fragment> {
        match chunk {
            UiStreamChunk::TextStart { .. } => vec![Fragment::PartStart(PartStart::Text)],
            UiStreamChunk::ReasoningStart { .. } => {
                vec![Fragment::PartStart(PartStart::Reasoning)]
            }
            UiStreamChunk::TextDelta { delta, .. } => vec![Fragment::TextDelta(delta)],
            UiStreamChunk::ReasoningDelta { delta, .. } => vec![Fragment::ReasoningDelta(delta)],
            UiStreamChunk::TextEnd { .. } => vec![Fragment::PartEnd(StreamedPart::Text)],
            UiStreamChunk::ReasoningEnd { .. } => {
                vec![Fragment::PartEnd(StreamedPart::Reasoning)]
            }
            UiStreamChunk::File { url, media_type } => {
                vec![Fragment::PartStart(PartStart::File { media_type, url })]
            }
            UiStreamChunk::ToolInputStart {
                tool_call_id,
                tool_name,
            } => {
                self.tool_calls
                    .entry(tool_call_id)
                    .or_insert((tool_name, serde_json::Value::Null));
                Vec::new()
            }
            UiStreamChunk::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => {
                self.tool_calls.insert(tool_call_id, (tool_name, input));
                Vec::new()
            }
            UiStreamChunk::ToolOutputAvailable {
                tool_call_id,
                output,
            } => {
                let (tool_name, input) = self
                    .tool_calls
                    .remove(&tool_call_id)
                    .unwrap_or_else(|| ("unknown".to_string(), serde_json::Value::Null));
                vec![Fragment::PartStart(PartStart::ToolResult {
                    tool_call_id,
                    tool_name,
                    input,
                    output,
                })]
            }
            UiStreamChunk::Finish => vec![Fragment::Done],
            UiStreamChunk::Abort => vec![Fragment::Failure(TransportError::Stream(
                "Response aborted by server".to_string(),
            ))],
            UiStreamChunk::Error { error_text } => {
                vec![Fragment::Failure(TransportError::Stream(error_text))]
            }
            UiStreamChunk::Other => Vec::new(),
        }
    }
}

/// Incremental UTF-8 decoding for the plain-text protocol; a multi-byte
/// character split across chunks is held back until it completes.
#[derive(Default)]
pub struct TextDecoder {
    pending: Vec<u8>,
}

impl TextDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<String>, TransportError> {
        self.pending.extend_from_slice(chunk);
        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(err) => {
                return Err(TransportError::Decode(format!(
                    "invalid UTF-8 in stream: {err}"
                )))
            }
        };
        if valid_up_to == 0 {
            return Ok(None);
        }
        let complete: Vec<u8> = self.pending.drain(..valid_up_to).collect();
        Ok(Some(String::from_utf8_lossy(&complete).into_owned()))
    }

    pub fn finish(&mut self) -> Result<(), TransportError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(TransportError::Decode(
                "stream ended inside a UTF-8 sequence".to_string(),
            ))
        }
    }
}

/// [`Transport`] over HTTP POST with a streamed response body.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    protocol: StreamProtocol,
    headers: Vec<(String, String)>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>, protocol: StreamProtocol) -> Self {
        Self {
            client,
            url: url.into(),
            protocol,
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn open(&self, request: ChatRequest, cancel: CancellationToken) -> StreamHandle {
        let (sink, handle) = StreamHandle::channel(cancel.clone());
        let transport = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = transport.run(request, &sink) => {}
                _ = cancel.cancelled() => {
                    debug!(url = %transport.url, "Chat stream cancelled");
                }
            }
        });

        handle
    }
}

impl HttpTransport {
    async fn run(&self, request: ChatRequest, sink: &FragmentSink) {
        debug!(
            url = %self.url,
            chat_id = %request.id,
            messages = request.messages.len(),
            protocol = %self.protocol,
            "Opening chat stream"
        );

        let mut http_request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        for (name, value) in &self.headers {
            http_request = http_request.header(name.as_str(), value.as_str());
        }

        let response = match http_request.json(&request).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "Chat request failed before a response");
                sink.send(Fragment::Failure(err.into()));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            debug!(status = status.as_u16(), "Chat endpoint returned an error status");
            sink.send(Fragment::Failure(TransportError::Status {
                status: status.as_u16(),
                message: summarize_error_body(&body),
            }));
            return;
        }

        if self.protocol == StreamProtocol::UiMessage
            && response.headers().get(UI_MESSAGE_STREAM_HEADER).is_none()
        {
            debug!("Response lacks the UI-message stream header; decoding as SSE anyway");
        }

        match self.protocol {
            StreamProtocol::UiMessage => forward_ui_message_stream(response, sink).await,
            StreamProtocol::Text => forward_text_stream(response, sink).await,
        }
    }
}

/// Emit each fragment until one is terminal or the consumer is gone.
/// Returns `true` when forwarding should stop.
fn emit_all(sink: &FragmentSink, fragments: Vec<Fragment>) -> bool {
    for fragment in fragments {
        let terminal = fragment.is_terminal();
        if !sink.send(fragment) || terminal {
            return true;
        }
    }
    false
}

async fn forward_ui_message_stream(response: reqwest::Response, sink: &FragmentSink) {
    let mut stream = response.bytes_stream();
    let mut lines = LineBuffer::default();
    let mut decoder = UiMessageDecoder::default();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                sink.send(Fragment::Failure(err.into()));
                return;
            }
        };

        for line in lines.push(&chunk) {
            let fragments = match line {
                Ok(line) => decoder.decode_line(&line),
                Err(err) => vec![Fragment::Failure(err)],
            };
            if emit_all(sink, fragments) {
                return;
            }
        }
    }

    if let Some(line) = lines.finish() {
        let fragments = match line {
            Ok(line) => decoder.decode_line(&line),
            Err(err) => vec![Fragment::Failure(err)],
        };
        if emit_all(sink, fragments) {
            return;
        }
    }

    debug!("Chat stream ended without a terminator");
    sink.send(Fragment::Done);
}

async fn forward_text_stream(response: reqwest::Response, sink: &FragmentSink) {
    let mut stream = response.bytes_stream();
    let mut decoder = TextDecoder::default();

    while let Some(chunk) = stream.next().await {
        let fragment = match chunk {
            Ok(chunk) => match decoder.push(&chunk) {
                Ok(Some(text)) => Fragment::TextDelta(text),
                Ok(None) => continue,
                Err(err) => Fragment::Failure(err),
            },
            Err(err) => Fragment::Failure(err.into()),
        };
        if emit_all(sink, vec![fragment]) {
            return;
        }
    }

    let last = match decoder.finish() {
        Ok(()) => Fragment::Done,
        Err(err) => Fragment::Failure(err),
    };
    sink.send(last);
}
