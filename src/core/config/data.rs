use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::chat_stream::StreamProtocol;

/// Settings persisted in `config.toml`. Every field is optional on disk; the
/// effective values come from the accessors in `defaults`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Root the endpoint paths are joined onto (e.g. "http://localhost:3000")
    pub base_url: Option<String>,
    pub chat_path: Option<String>,
    pub transcribe_path: Option<String>,
    /// Framing of the chat response body
    pub stream_protocol: Option<StreamProtocol>,
    pub max_attachments: Option<usize>,
    /// Whole-request limit for chat streams; unset means no limit
    pub request_timeout_secs: Option<u64>,
    /// Extra headers sent with every request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths under `$HOME` to `~` notation on Unix-like systems
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
