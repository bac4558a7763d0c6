//! Chat session state machine.
//!
//! A session owns the message list, the pending attachments, and at most one
//! in-flight request. Status moves `ready -> submitted -> streaming -> ready`,
//! or into `error` when the transport fails; `stop` returns a busy session to
//! `ready` and keeps whatever the assistant had produced so far.
//!
//! Every request gets a fresh stream id. Fragments carrying an id other than
//! the active one are ignored, so a stopped or superseded stream can never
//! touch the message list again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatRequest;
use crate::core::attachments::{Attachment, AttachmentSet, EncodedAttachment};
use crate::core::chat_stream::{Fragment, PartStart, StreamHandle, StreamedPart, Transport};
use crate::core::constants::MAX_ATTACHMENTS;
use crate::core::error::{InvalidTransition, SendError, TransportError, ValidationError};
use crate::core::message::{Message, MessagePart};
use crate::utils::ids::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    /// Idle and accepting input.
    Ready,
    /// Request sent, nothing received yet.
    Submitted,
    /// At least one fragment has been folded in.
    Streaming,
    /// The last request failed; see [`ChatSession::error`].
    Error,
}

impl ChatStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatStatus::Ready => "ready",
            ChatStatus::Submitted => "submitted",
            ChatStatus::Streaming => "streaming",
            ChatStatus::Error => "error",
        }
    }

    pub fn is_busy(self) -> bool {
        matches!(self, ChatStatus::Submitted | ChatStatus::Streaming)
    }

    pub fn can_transition_to(self, next: ChatStatus) -> bool {
        use ChatStatus::*;
        matches!(
            (self, next),
            (Ready | Error, Submitted)
                | (Submitted, Streaming)
                | (Submitted | Streaming, Ready)
                | (Submitted | Streaming, Error)
                | (Error, Ready)
        )
    }
}

/// Result of folding one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Applied,
    /// The fragment belonged to a stream that is no longer active.
    Ignored,
    /// The stream reached a terminal state.
    Finished(ChatStatus),
}

/// An accepted send: the stream to pump and the id its fragments carry.
pub struct PendingStream {
    pub stream_id: u64,
    pub handle: StreamHandle,
}

struct ActiveRequest {
    stream_id: u64,
    cancel: CancellationToken,
    placeholder_id: String,
    /// Index into the placeholder's parts of the open text part.
    open_text: Option<usize>,
    open_reasoning: Option<usize>,
}

impl ActiveRequest {
    fn open_slot(&mut self, kind: StreamedPart) -> &mut Option<usize> {
        match kind {
            StreamedPart::Text => &mut self.open_text,
            StreamedPart::Reasoning => &mut self.open_reasoning,
        }
    }
}

pub struct ChatSession {
    id: String,
    messages: Vec<Message>,
    status: ChatStatus,
    error: Option<TransportError>,
    active: Option<ActiveRequest>,
    last_stream_id: u64,
    attachments: AttachmentSet,
    transport: Arc<dyn Transport>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_attachment_limit(transport, MAX_ATTACHMENTS)
    }

    pub fn with_attachment_limit(transport: Arc<dyn Transport>, max_attachments: usize) -> Self {
        Self {
            id: generate_id(),
            messages: Vec::new(),
            status: ChatStatus::Ready,
            error: None,
            active: None,
            last_stream_id: 0,
            attachments: AttachmentSet::new(max_attachments),
            transport,
        }
    }

    pub fn into_shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.status.is_busy()
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.stream_id == stream_id)
    }

    pub fn pending_attachments(&self) -> &[Attachment] {
        self.attachments.list()
    }

    pub fn select_attachments(&mut self, files: Vec<Attachment>) -> Result<(), ValidationError> {
        self.attachments.select(files)
    }

    pub fn remove_attachment(&mut self, index: usize) -> Result<Attachment, ValidationError> {
        self.attachments.remove(index)
    }

    /// Acknowledge a failure and return to `ready`.
    pub fn clear_error(&mut self) -> Result<(), InvalidTransition> {
        if self.status == ChatStatus::Error {
            self.transition(ChatStatus::Ready)?;
        }
        self.error = None;
        Ok(())
    }

    /// Append a user message built from `text` and `attachments` and open a
    /// request for the assistant's reply.
    ///
    /// File parts precede the text part. Rejected without side effects when
    /// both inputs are empty or a request is already in flight.
    pub fn send_message(
        &mut self,
        text: &str,
        attachments: Vec<EncodedAttachment>,
    ) -> Result<PendingStream, SendError> {
        self.check_can_send(text, attachments.len())?;

        let mut parts: Vec<MessagePart> = attachments.iter().map(EncodedAttachment::to_part).collect();
        if !text.trim().is_empty() {
            parts.push(MessagePart::text(text));
        }

        self.transition(ChatStatus::Submitted)
            .map_err(|_| SendError::Busy(self.status))?;
        self.error = None;
        self.messages.push(Message::user(parts));
        let request = ChatRequest::submit(self.id.clone(), &self.messages);

        let placeholder = Message::assistant_placeholder();
        let placeholder_id = placeholder.id.clone();
        self.messages.push(placeholder);

        self.last_stream_id += 1;
        let stream_id = self.last_stream_id;
        let cancel = CancellationToken::new();
        self.active = Some(ActiveRequest {
            stream_id,
            cancel: cancel.clone(),
            placeholder_id,
            open_text: None,
            open_reasoning: None,
        });

        debug!(
            chat_id = %self.id,
            stream_id,
            history = request.messages.len(),
            "Submitting message"
        );
        let handle = self.transport.open(request, cancel);
        Ok(PendingStream { stream_id, handle })
    }

    /// Encode the pending attachments and send them with `text`. The pending
    /// set is cleared only once the send is accepted.
    pub async fn send_pending(&mut self, text: &str) -> Result<PendingStream, SendError> {
        self.check_can_send(text, self.attachments.len())?;

        let encoded = self
            .attachments
            .encode()
            .await
            .map_err(|err| SendError::AttachmentRead {
                name: err.name.clone(),
                message: err.source.to_string(),
            })?;
        let pending = self.send_message(text, encoded)?;
        self.attachments.clear();
        Ok(pending)
    }

    fn check_can_send(&self, text: &str, attachment_count: usize) -> Result<(), SendError> {
        if self.status.is_busy() {
            warn!(status = self.status.as_str(), "Send rejected while a response is in flight");
            return Err(SendError::Busy(self.status));
        }
        if text.trim().is_empty() && attachment_count == 0 {
            return Err(ValidationError::EmptyMessage.into());
        }
        Ok(())
    }

    /// Fold one fragment of stream `stream_id` into the assistant placeholder.
    pub fn apply(
        &mut self,
        stream_id: u64,
        fragment: Fragment,
    ) -> Result<FoldOutcome, InvalidTransition> {
        if !self.is_current_stream(stream_id) {
            debug!(stream_id, "Ignoring fragment from inactive stream");
            return Ok(FoldOutcome::Ignored);
        }

        match fragment {
            Fragment::TextDelta(text) => {
                self.begin_streaming()?;
                self.fold_delta(StreamedPart::Text, &text);
                Ok(FoldOutcome::Applied)
            }
            Fragment::ReasoningDelta(text) => {
                self.begin_streaming()?;
                self.fold_delta(StreamedPart::Reasoning, &text);
                Ok(FoldOutcome::Applied)
            }
            Fragment::PartStart(kind) => {
                self.begin_streaming()?;
                self.fold_part_start(kind);
                Ok(FoldOutcome::Applied)
            }
            Fragment::PartEnd(kind) => {
                self.begin_streaming()?;
                if let Some(active) = self.active.as_mut() {
                    *active.open_slot(kind) = None;
                }
                Ok(FoldOutcome::Applied)
            }
            Fragment::Done => self.complete(),
            Fragment::Failure(err) => self.fail(err),
        }
    }

    /// The stream for `stream_id` ended without a terminal fragment.
    pub fn stream_closed(&mut self, stream_id: u64) -> Result<FoldOutcome, InvalidTransition> {
        let Some(active) = self.active.as_ref().filter(|a| a.stream_id == stream_id) else {
            return Ok(FoldOutcome::Ignored);
        };

        if active.cancel.is_cancelled() {
            self.stop();
            return Ok(FoldOutcome::Finished(self.status));
        }
        self.fail(TransportError::Network(
            "Stream closed before the response completed".to_string(),
        ))
    }

    /// Cancel the in-flight request, keep the partial reply, and return to
    /// `ready`. Returns `false` when nothing was in flight.
    pub fn stop(&mut self) -> bool {
        if !self.status.is_busy() {
            return false;
        }
        let Some(active) = self.active.take() else {
            return false;
        };

        active.cancel.cancel();
        self.finalize_placeholder(&active.placeholder_id);
        self.status = ChatStatus::Ready;
        debug!(stream_id = active.stream_id, "Stream stopped by caller");
        true
    }

    fn complete(&mut self) -> Result<FoldOutcome, InvalidTransition> {
        self.transition(ChatStatus::Ready)?;
        if let Some(active) = self.active.take() {
            self.finalize_placeholder(&active.placeholder_id);
            debug!(stream_id = active.stream_id, "Stream completed");
        }
        Ok(FoldOutcome::Finished(ChatStatus::Ready))
    }

    fn fail(&mut self, err: TransportError) -> Result<FoldOutcome, InvalidTransition> {
        self.transition(ChatStatus::Error)?;
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            self.finalize_placeholder(&active.placeholder_id);
            warn!(stream_id = active.stream_id, error = %err, "Stream failed");
        }
        self.error = Some(err);
        Ok(FoldOutcome::Finished(ChatStatus::Error))
    }

    fn begin_streaming(&mut self) -> Result<(), InvalidTransition> {
        if self.status == ChatStatus::Submitted {
            self.transition(ChatStatus::Streaming)?;
        }
        Ok(())
    }

    fn transition(&mut self, next: ChatStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        debug!(from = self.status.as_str(), to = next.as_str(), "Session transition");
        self.status = next;
        Ok(())
    }

    /// Extend the open part of `kind`. Without one, a delta continues a
    /// trailing part of the same kind or starts a new part.
    fn fold_delta(&mut self, kind: StreamedPart, text: &str) {
        let open = self.active.as_ref().and_then(|active| match kind {
            StreamedPart::Text => active.open_text,
            StreamedPart::Reasoning => active.open_reasoning,
        });
        let Some(message) = self.placeholder_mut() else {
            return;
        };

        let target = open.or_else(|| {
            message
                .parts
                .last()
                .filter(|part| streamed_kind(part) == Some(kind))
                .map(|_| message.parts.len() - 1)
        });
        match target.and_then(|index| message.parts.get_mut(index)) {
            Some(part) => {
                part.append(text);
            }
            None => message.parts.push(streamed_part(kind, text)),
        }
    }

    fn fold_part_start(&mut self, kind: PartStart) {
        let (part, opens) = match kind {
            PartStart::Text => (streamed_part(StreamedPart::Text, ""), Some(StreamedPart::Text)),
            PartStart::Reasoning => (
                streamed_part(StreamedPart::Reasoning, ""),
                Some(StreamedPart::Reasoning),
            ),
            PartStart::File { media_type, url } => (
                MessagePart::File {
                    media_type,
                    url,
                    filename: None,
                },
                None,
            ),
            PartStart::ToolResult {
                tool_call_id,
                tool_name,
                input,
                output,
            } => (
                MessagePart::ToolResult {
                    tool_call_id,
                    tool_name,
                    input,
                    output,
                },
                None,
            ),
        };

        let Some(message) = self.placeholder_mut() else {
            return;
        };
        message.parts.push(part);
        let index = message.parts.len() - 1;
        if let (Some(kind), Some(active)) = (opens, self.active.as_mut()) {
            *active.open_slot(kind) = Some(index);
        }
    }

    fn placeholder_mut(&mut self) -> Option<&mut Message> {
        let placeholder_id = &self.active.as_ref()?.placeholder_id;
        self.messages
            .iter_mut()
            .rev()
            .find(|message| &message.id == placeholder_id)
    }

    /// Freeze the placeholder. Text and reasoning parts that were opened but
    /// never extended are discarded; a placeholder left without parts is
    /// dropped.
    fn finalize_placeholder(&mut self, placeholder_id: &str) {
        let Some(position) = self
            .messages
            .iter()
            .rposition(|message| message.id == placeholder_id)
        else {
            return;
        };

        let message = &mut self.messages[position];
        message.parts.retain(|part| part.as_text() != Some(""));
        if message.parts.is_empty() {
            self.messages.remove(position);
        }
    }
}

fn streamed_kind(part: &MessagePart) -> Option<StreamedPart> {
    match part {
        MessagePart::Text { .. } => Some(StreamedPart::Text),
        MessagePart::Reasoning { .. } => Some(StreamedPart::Reasoning),
        _ => None,
    }
}

fn streamed_part(kind: StreamedPart, text: &str) -> MessagePart {
    match kind {
        StreamedPart::Text => MessagePart::text(text),
        StreamedPart::Reasoning => MessagePart::Reasoning {
            text: text.to_string(),
        },
    }
}

/// Drive `pending` to completion, folding each fragment into `session` and
/// calling `on_update` after every state change.
///
/// With a `timeout`, an elapsed deadline stops the stream as if the caller
/// had called [`ChatSession::stop`]. Returns the status the stream left the
/// session in.
pub async fn run_stream<F>(
    session: &Mutex<ChatSession>,
    pending: PendingStream,
    timeout: Option<Duration>,
    mut on_update: F,
) -> ChatStatus
where
    F: FnMut(&ChatSession),
{
    let PendingStream {
        stream_id,
        mut handle,
    } = pending;
    let deadline = timeout.map(|limit| tokio::time::Instant::now() + limit);

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, handle.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let mut guard = session.lock().await;
                    if guard.is_current_stream(stream_id) {
                        debug!(stream_id, "Stream deadline elapsed");
                        guard.stop();
                        on_update(&*guard);
                    }
                    handle.cancel();
                    return guard.status();
                }
            },
            None => handle.next().await,
        };

        let mut guard = session.lock().await;
        let outcome = match next {
            Some(fragment) => guard.apply(stream_id, fragment),
            None => guard.stream_closed(stream_id),
        };

        match outcome {
            Ok(FoldOutcome::Applied) => on_update(&*guard),
            Ok(FoldOutcome::Finished(status)) => {
                on_update(&*guard);
                return status;
            }
            Ok(FoldOutcome::Ignored) => return guard.status(),
            Err(err) => {
                warn!(error = %err, stream_id, "Dropping stream after invalid transition");
                handle.cancel();
                return guard.status();
            }
        }
    }
}
