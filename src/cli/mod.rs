//! Command-line interface parsing and handling
//!
//! This module parses arguments, resolves configuration (file values with
//! per-invocation overrides), and dispatches to the subcommand handlers.

pub mod chat;
pub mod printer;
pub mod say;
pub mod transcribe;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use crate::cli::chat::run_chat;
use crate::cli::say::run_say;
use crate::cli::transcribe::run_transcribe;
use crate::core::chat_stream::HttpTransport;
use crate::core::config::Config;
use crate::core::session::ChatSession;
use crate::core::transcription::TranscriptionClient;
use crate::utils::logging::init_tracing;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "parlance", version = VERSION)]
#[command(about = "Terminal client for streaming chat and audio transcription endpoints")]
#[command(
    long_about = "Parlance talks to a chat endpoint that streams replies as UI-message events \
and to a companion audio transcription endpoint.\n\n\
Configuration lives in config.toml under the platform config directory; use \
'parlance set' to see the effective values.\n\n\
Chat commands:\n\
  /attach <path>    Stage a file to send with the next message\n\
  /remove <n>       Drop staged file number n\n\
  /list             Show staged files\n\
  /quit             Leave the chat\n\n\
Ctrl+C stops a reply that is still streaming, or leaves the chat at the prompt."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Endpoint root for this run (overrides base_url in the config file)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Stop a reply after this many seconds (0 disables the limit)
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message and stream the reply to stdout
    Say {
        /// File to attach (repeatable)
        #[arg(short = 'a', long = "attach", value_name = "FILE")]
        attachments: Vec<PathBuf>,
        /// Message text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Start an interactive chat (default)
    Chat,
    /// Transcribe one audio file
    Transcribe {
        file: PathBuf,
        /// Also print timed segments when the endpoint returns them
        #[arg(long)]
        segments: bool,
    },
    /// Set a configuration value, or show the configuration when no key is given
    Set {
        key: Option<String>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset a configuration value
    Unset {
        key: String,
        /// Header name when unsetting a single header
        value: Option<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async_main(args));
    // A chat left with Ctrl-C still has a blocking stdin read in flight.
    runtime.shutdown_background();
    result
}

/// Resolves on Ctrl-C. Pends forever when the handler cannot be installed.
pub(crate) async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let Args {
        command,
        base_url,
        timeout,
        ..
    } = args;
    let resolve = || -> Result<Config, Box<dyn Error>> {
        let config = apply_overrides(Config::load()?, base_url.as_deref(), timeout);
        debug!(
            chat_url = %config.chat_url(),
            protocol = %config.stream_protocol(),
            "Resolved configuration"
        );
        Ok(config)
    };

    match command.unwrap_or(Commands::Chat) {
        Commands::Say {
            attachments,
            prompt,
        } => run_say(&resolve()?, attachments, prompt).await,
        Commands::Chat => run_chat(&resolve()?).await,
        Commands::Transcribe { file, segments } => {
            run_transcribe(&resolve()?, file, segments).await
        }
        Commands::Set { key, value } => run_set(key, value),
        Commands::Unset { key, value } => run_unset(&key, value.as_deref()),
    }
}

/// Layer command-line flags over the values read from disk.
pub fn apply_overrides(mut config: Config, base_url: Option<&str>, timeout: Option<u64>) -> Config {
    if let Some(base_url) = base_url {
        config.base_url = Some(base_url.to_string());
    }
    if let Some(timeout) = timeout {
        config.request_timeout_secs = Some(timeout);
    }
    config
}

/// A session wired to the configured chat endpoint.
pub fn build_session(config: &Config) -> ChatSession {
    let transport = HttpTransport::new(
        reqwest::Client::new(),
        config.chat_url(),
        config.stream_protocol(),
    )
    .with_headers(config.header_pairs());
    ChatSession::with_attachment_limit(Arc::new(transport), config.max_attachments())
}

pub fn build_transcription_client(config: &Config) -> Result<TranscriptionClient, Box<dyn Error>> {
    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in config.header_pairs() {
        headers.insert(
            reqwest::header::HeaderName::from_bytes(name.as_bytes())?,
            reqwest::header::HeaderValue::from_str(&value)?,
        );
    }
    let client = reqwest::Client::builder()
        .default_headers(headers)
        .build()?;
    Ok(TranscriptionClient::new(client, config.transcribe_url()))
}

fn run_set(key: Option<String>, value: Vec<String>) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    let Some(key) = key else {
        config.print_all();
        return Ok(());
    };
    if value.is_empty() {
        config.print_all();
        return Ok(());
    }

    let value = value.join(" ");
    config.set_key(&key, &value)?;
    config.save()?;
    println!("✅ Set {key} to: {value}");
    Ok(())
}

fn run_unset(key: &str, value: Option<&str>) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    config.unset_key(key, value)?;
    config.save()?;
    match value {
        Some(value) => println!("✅ Unset {key}: {value}"),
        None => println!("✅ Unset {key}"),
    }
    Ok(())
}
