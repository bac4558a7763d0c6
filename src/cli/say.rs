//! One-shot "say" command

use std::error::Error;
use std::future::Future;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::debug;

use crate::cli::{build_session, interrupted};
use crate::cli::printer::StreamPrinter;
use crate::core::attachments::Attachment;
use crate::core::config::Config;
use crate::core::session::{run_stream, ChatSession, ChatStatus, PendingStream};

pub async fn run_say(
    config: &Config,
    attachments: Vec<PathBuf>,
    prompt: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() && attachments.is_empty() {
        return Err("Usage: parlance say [-a FILE]... <prompt>".into());
    }

    let mut session = build_session(config);
    let mut staged = Vec::with_capacity(attachments.len());
    for path in &attachments {
        let attachment = Attachment::from_path(path)
            .await
            .map_err(|err| format!("Cannot attach {}: {err}", path.display()))?;
        staged.push(attachment);
    }
    session.select_attachments(staged)?;

    let pending = session.send_pending(&prompt).await?;
    let session = session.into_shared();
    let status = stream_reply(&session, pending, config, interrupted()).await;

    let guard = session.lock().await;
    match (status, guard.error()) {
        (ChatStatus::Error, Some(err)) => Err(err.to_string().into()),
        _ => Ok(()),
    }
}

/// Print the reply as it streams. When `interrupt` resolves first the
/// stream is stopped and what arrived so far is kept.
pub(crate) async fn stream_reply<I>(
    session: &Mutex<ChatSession>,
    pending: PendingStream,
    config: &Config,
    interrupt: I,
) -> ChatStatus
where
    I: Future<Output = ()>,
{
    let mut printer = StreamPrinter::new();
    let pump = run_stream(session, pending, config.request_timeout(), |s| {
        printer.update(s)
    });
    tokio::pin!(pump);

    let status = tokio::select! {
        status = &mut pump => status,
        _ = interrupt => {
            debug!("Interrupted; stopping stream");
            session.lock().await.stop();
            pump.await
        }
    };

    println!();
    debug!(status = status.as_str(), "Reply finished");
    status
}
