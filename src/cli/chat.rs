//! Line-oriented interactive chat.

use std::error::Error;
use std::future::Future;
use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::debug;

use crate::cli::say::stream_reply;
use crate::cli::{build_session, interrupted};
use crate::core::attachments::Attachment;
use crate::core::config::Config;
use crate::core::session::{ChatSession, ChatStatus};

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Attach(String),
    /// 1-based position as shown by `/list`.
    Remove(usize),
    List,
    Quit,
    Send(String),
    Invalid(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return ReplCommand::Send(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match name {
            "attach" if !arg.is_empty() => ReplCommand::Attach(arg.to_string()),
            "attach" => ReplCommand::Invalid("Usage: /attach <path>".to_string()),
            "remove" => match arg.parse::<usize>() {
                Ok(n) if n > 0 => ReplCommand::Remove(n),
                _ => ReplCommand::Invalid("Usage: /remove <n>".to_string()),
            },
            "list" => ReplCommand::List,
            "quit" | "exit" => ReplCommand::Quit,
            _ => ReplCommand::Invalid(format!("Unknown command: /{name}")),
        }
    }
}

pub async fn run_chat(config: &Config) -> Result<(), Box<dyn Error>> {
    let session = build_session(config).into_shared();
    let lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Chatting with {} (/attach <path>, /list, /remove <n>, /quit)",
        config.chat_url()
    );
    repl(&session, lines, config, interrupted).await
}

/// Read and dispatch lines until `/quit`, end of input, or `interrupt`
/// resolving at the prompt. While a reply streams, `interrupt` stops it
/// instead.
pub(crate) async fn repl<R, I, F>(
    session: &Mutex<ChatSession>,
    mut lines: Lines<R>,
    config: &Config,
    interrupt: I,
) -> Result<(), Box<dyn Error>>
where
    R: AsyncBufRead + Unpin,
    I: Fn() -> F,
    F: Future<Output = ()>,
{
    loop {
        prompt(&*session.lock().await);
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupt() => {
                println!();
                debug!("Interrupted at the prompt");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Quit => break,
            ReplCommand::Invalid(message) => eprintln!("⚠️  {message}"),
            ReplCommand::List => list_attachments(&*session.lock().await),
            ReplCommand::Attach(path) => match Attachment::from_path(&path).await {
                Ok(attachment) => {
                    let mut guard = session.lock().await;
                    match guard.select_attachments(vec![attachment]) {
                        Ok(()) => println!("📎 Attached {path}"),
                        Err(err) => eprintln!("⚠️  {err}"),
                    }
                }
                Err(err) => eprintln!("⚠️  Cannot attach {path}: {err}"),
            },
            ReplCommand::Remove(position) => {
                let mut guard = session.lock().await;
                match guard.remove_attachment(position - 1) {
                    Ok(removed) => println!("Removed {}", removed.name),
                    Err(err) => eprintln!("⚠️  {err}"),
                }
            }
            ReplCommand::Send(text) => {
                let sent = session.lock().await.send_pending(&text).await;
                let pending = match sent {
                    Ok(pending) => pending,
                    Err(err) => {
                        eprintln!("⚠️  {err}");
                        continue;
                    }
                };
                if stream_reply(session, pending, config, interrupt()).await == ChatStatus::Error {
                    let mut guard = session.lock().await;
                    if let Some(err) = guard.error() {
                        eprintln!("❌ {err}");
                    }
                    guard.clear_error()?;
                }
            }
        }
    }
    Ok(())
}

fn prompt(session: &ChatSession) {
    let staged = session.pending_attachments().len();
    if staged > 0 {
        print!("[{staged} attached] > ");
    } else {
        print!("> ");
    }
    let _ = std::io::stdout().flush();
}

fn list_attachments(session: &ChatSession) {
    let pending = session.pending_attachments();
    if pending.is_empty() {
        println!("No attachments staged.");
        return;
    }
    for (index, attachment) in pending.iter().enumerate() {
        println!(
            "  {}. {} ({}, {} bytes)",
            index + 1,
            attachment.name,
            attachment.media_type,
            attachment.byte_size
        );
    }
}
