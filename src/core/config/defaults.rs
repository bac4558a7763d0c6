use std::fmt;
use std::time::Duration;

use crate::core::chat_stream::StreamProtocol;
use crate::core::config::data::Config;
use crate::core::constants::MAX_ATTACHMENTS;
use crate::utils::url::{endpoint_url, normalize_base_url};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_CHAT_PATH: &str = "api/chat";
pub const DEFAULT_TRANSCRIBE_PATH: &str = "api/transcribe-audio";

/// Keys accepted by `set` and `unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    BaseUrl,
    ChatPath,
    TranscribePath,
    StreamProtocol,
    MaxAttachments,
    RequestTimeout,
    Header,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 7] = [
        ConfigKey::BaseUrl,
        ConfigKey::ChatPath,
        ConfigKey::TranscribePath,
        ConfigKey::StreamProtocol,
        ConfigKey::MaxAttachments,
        ConfigKey::RequestTimeout,
        ConfigKey::Header,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::BaseUrl => "base-url",
            ConfigKey::ChatPath => "chat-path",
            ConfigKey::TranscribePath => "transcribe-path",
            ConfigKey::StreamProtocol => "stream-protocol",
            ConfigKey::MaxAttachments => "max-attachments",
            ConfigKey::RequestTimeout => "request-timeout",
            ConfigKey::Header => "header",
        }
    }

    /// Accepts the dashed names, their snake_case spellings, and a few aliases.
    pub fn parse(key: &str) -> Result<Self, ConfigKeyError> {
        let normalized = key.trim().to_ascii_lowercase().replace('_', "-");
        let normalized = match normalized.as_str() {
            "request-timeout-secs" | "timeout" => "request-timeout",
            "headers" => "header",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
            .ok_or_else(|| ConfigKeyError::UnknownKey(key.to_string()))
    }
}

/// A `set`/`unset` request that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigKeyError {
    UnknownKey(String),
    MissingValue(&'static str),
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKeyError::UnknownKey(key) => write!(
                f,
                "Unknown config key: {key} (expected one of: {})",
                ConfigKey::ALL.map(ConfigKey::as_str).join(", ")
            ),
            ConfigKeyError::MissingValue(key) => write!(f, "A value is required for {key}"),
            ConfigKeyError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {key}: {value}")
            }
        }
    }
}

impl std::error::Error for ConfigKeyError {}

impl Config {
    pub fn base_url(&self) -> String {
        normalize_base_url(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))
    }

    pub fn chat_url(&self) -> String {
        endpoint_url(
            &self.base_url(),
            self.chat_path.as_deref().unwrap_or(DEFAULT_CHAT_PATH),
        )
    }

    pub fn transcribe_url(&self) -> String {
        endpoint_url(
            &self.base_url(),
            self.transcribe_path
                .as_deref()
                .unwrap_or(DEFAULT_TRANSCRIBE_PATH),
        )
    }

    pub fn stream_protocol(&self) -> StreamProtocol {
        self.stream_protocol.unwrap_or_default()
    }

    pub fn max_attachments(&self) -> usize {
        self.max_attachments.unwrap_or(MAX_ATTACHMENTS)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Apply `parlance set <key> <value>`. A header value is `Name: value`.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<(), ConfigKeyError> {
        let value = value.trim();
        let key = ConfigKey::parse(key)?;
        if value.is_empty() {
            return Err(ConfigKeyError::MissingValue(key.as_str()));
        }
        let invalid = || ConfigKeyError::InvalidValue {
            key: key.as_str(),
            value: value.to_string(),
        };

        match key {
            ConfigKey::BaseUrl => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(invalid());
                }
                self.base_url = Some(normalize_base_url(value));
            }
            ConfigKey::ChatPath => self.chat_path = Some(value.trim_start_matches('/').to_string()),
            ConfigKey::TranscribePath => {
                self.transcribe_path = Some(value.trim_start_matches('/').to_string())
            }
            ConfigKey::StreamProtocol => {
                self.stream_protocol = Some(value.parse().map_err(|_| invalid())?);
            }
            ConfigKey::MaxAttachments => {
                let max = value.parse::<usize>().map_err(|_| invalid())?;
                if max == 0 {
                    return Err(invalid());
                }
                self.max_attachments = Some(max);
            }
            ConfigKey::RequestTimeout => {
                self.request_timeout_secs = Some(value.parse().map_err(|_| invalid())?);
            }
            ConfigKey::Header => {
                let (name, header_value) = value.split_once(':').ok_or_else(invalid)?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(invalid());
                }
                self.headers
                    .insert(name.to_string(), header_value.trim().to_string());
            }
        }
        Ok(())
    }

    /// Apply `parlance unset <key> [value]`. `header` takes the header name;
    /// without one, every header is removed.
    pub fn unset_key(&mut self, key: &str, value: Option<&str>) -> Result<(), ConfigKeyError> {
        match ConfigKey::parse(key)? {
            ConfigKey::BaseUrl => self.base_url = None,
            ConfigKey::ChatPath => self.chat_path = None,
            ConfigKey::TranscribePath => self.transcribe_path = None,
            ConfigKey::StreamProtocol => self.stream_protocol = None,
            ConfigKey::MaxAttachments => self.max_attachments = None,
            ConfigKey::RequestTimeout => self.request_timeout_secs = None,
            ConfigKey::Header => match value.map(str::trim).filter(|v| !v.is_empty()) {
                Some(name) => {
                    self.headers
                        .retain(|existing, _| !existing.eq_ignore_ascii_case(name));
                }
                None => self.headers.clear(),
            },
        }
        Ok(())
    }
}
