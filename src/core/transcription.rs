//! Audio transcription client.
//!
//! One audio file is posted as the `audio` field of a multipart form. The
//! endpoint answers with a transcript on success or `{"error": "..."}` on
//! failure; both validation and endpoint failures are returned to the caller
//! and leave no state behind.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::{ErrorResponse, TranscriptionResponse};
use crate::core::attachments::Attachment;
use crate::core::constants::AUDIO_FIELD;
use crate::core::error::{summarize_error_body, TranscriptionError, ValidationError};
use crate::utils::media::is_audio;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    #[serde(rename = "startSecond", alias = "start")]
    pub start_seconds: f64,
    #[serde(rename = "endSecond", alias = "end")]
    pub end_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptResult {
    pub text: String,
    #[serde(default)]
    pub segments: Option<Vec<TranscriptSegment>>,
    #[serde(default)]
    pub language: Option<String>,
    /// Zero when the endpoint does not report a duration.
    #[serde(default, rename = "durationInSeconds", alias = "durationSeconds")]
    pub duration_seconds: f64,
}

/// Capability to turn one audio file into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: Option<Attachment>,
    ) -> Result<TranscriptResult, TranscriptionError>;
}

#[derive(Clone)]
pub struct TranscriptionClient {
    client: reqwest::Client,
    url: String,
}

impl TranscriptionClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Reject input the endpoint would refuse, before any bytes are read.
pub fn validate_audio(audio: Option<&Attachment>) -> Result<&Attachment, ValidationError> {
    let audio = audio.ok_or(ValidationError::MissingAudio)?;
    if audio.byte_size == 0 {
        return Err(ValidationError::EmptyAudio {
            name: audio.name.clone(),
        });
    }
    if !is_audio(&audio.media_type) {
        return Err(ValidationError::NotAudio {
            name: audio.name.clone(),
            media_type: audio.media_type.clone(),
        });
    }
    Ok(audio)
}

#[async_trait]
impl Transcriber for TranscriptionClient {
    async fn transcribe(
        &self,
        audio: Option<Attachment>,
    ) -> Result<TranscriptResult, TranscriptionError> {
        let audio = validate_audio(audio.as_ref())?;
        let bytes = audio.read_bytes().await?;
        if bytes.is_empty() {
            return Err(ValidationError::EmptyAudio {
                name: audio.name.clone(),
            }
            .into());
        }

        debug!(
            url = %self.url,
            file = %audio.name,
            bytes = bytes.len(),
            "Uploading audio for transcription"
        );
        let part = Part::bytes(bytes)
            .file_name(audio.name.clone())
            .mime_str(&audio.media_type)?;
        let form = Form::new().part(AUDIO_FIELD, part);

        let response = self.client.post(&self.url).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.error)
                .unwrap_or_else(|_| summarize_error_body(&body));
            warn!(status = status.as_u16(), %message, "Transcription failed");
            return Err(TranscriptionError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let decoded: TranscriptionResponse = serde_json::from_str(&body)
            .map_err(|err| TranscriptionError::Decode(err.to_string()))?;
        Ok(decoded.transcription)
    }
}

/// Single-file staging slot for audio awaiting transcription.
#[derive(Debug, Default, Clone)]
pub struct AudioSelection {
    file: Option<Attachment>,
}

impl AudioSelection {
    /// Stage `files`, replacing any earlier selection. More than one file is
    /// refused and the slot is left as it was.
    pub fn select(&mut self, mut files: Vec<Attachment>) -> Result<(), ValidationError> {
        if files.len() > 1 {
            return Err(ValidationError::TooManyAudioFiles(files.len()));
        }
        self.file = files.pop();
        Ok(())
    }

    pub fn selected(&self) -> Option<&Attachment> {
        self.file.as_ref()
    }

    pub fn clear(&mut self) {
        self.file = None;
    }

    /// Transcribe the staged file; the slot is emptied only on success.
    pub async fn transcribe_with(
        &mut self,
        transcriber: &dyn Transcriber,
    ) -> Result<TranscriptResult, TranscriptionError> {
        let result = transcriber.transcribe(self.file.clone()).await?;
        self.clear();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{FixtureResponse, FixtureServer};

    const SUCCESS: &str = r#"{"transcription":{"text":"hello there","segments":[{"text":"hello","startSecond":0,"endSecond":0.5},{"text":"there","startSecond":0.5,"endSecond":1.2}],"language":"en","durationInSeconds":1.2}}"#;

    fn clip() -> Attachment {
        Attachment::from_bytes("clip.mp3", None, b"ID3fakeaudio".to_vec())
    }

    #[test]
    fn transcript_accepts_either_duration_spelling() {
        let sdk: TranscriptResult =
            serde_json::from_str(r#"{"text":"a","durationInSeconds":3.5}"#).expect("decode");
        let plain: TranscriptResult =
            serde_json::from_str(r#"{"text":"a","durationSeconds":3.5}"#).expect("decode");
        assert_eq!(sdk.duration_seconds, 3.5);
        assert_eq!(plain, sdk);
    }

    #[test]
    fn transcript_accepts_both_segment_spellings() {
        let raw = r#"{"text":"hi","segments":[{"text":"hi","start":1.0,"end":2.5}]}"#;
        let result: TranscriptResult = serde_json::from_str(raw).expect("decode");
        let segments = result.segments.expect("segments");
        assert_eq!(segments[0].start_seconds, 1.0);
        assert_eq!(segments[0].end_seconds, 2.5);
        assert_eq!(result.language, None);
        assert_eq!(result.duration_seconds, 0.0);
    }

    #[tokio::test]
    async fn missing_audio_fails_without_a_request() {
        let server = FixtureServer::start(vec![]).await;
        let client = TranscriptionClient::new(reqwest::Client::new(), server.url("/api/transcribe-audio"));

        let err = client.transcribe(None).await.expect_err("missing audio");

        assert!(matches!(
            err,
            TranscriptionError::Validation(ValidationError::MissingAudio)
        ));
        assert_eq!(err.to_string(), "Audio file is required");
        assert!(server.requests().await.is_empty());
    }

    #[tokio::test]
    async fn empty_and_non_audio_files_are_rejected_locally() {
        let server = FixtureServer::start(vec![]).await;
        let client = TranscriptionClient::new(reqwest::Client::new(), server.url("/api/transcribe-audio"));

        let empty = Attachment::from_bytes("silence.wav", None, Vec::new());
        let err = client.transcribe(Some(empty)).await.expect_err("empty");
        assert!(matches!(
            err,
            TranscriptionError::Validation(ValidationError::EmptyAudio { .. })
        ));

        let image = Attachment::from_bytes("cat.png", None, vec![1, 2, 3]);
        let err = client.transcribe(Some(image)).await.expect_err("not audio");
        assert!(matches!(
            err,
            TranscriptionError::Validation(ValidationError::NotAudio { .. })
        ));
        assert!(server.requests().await.is_empty());
    }

    #[tokio::test]
    async fn successful_upload_returns_the_transcript() {
        let server = FixtureServer::start(vec![FixtureResponse::json(200, SUCCESS)]).await;
        let client = TranscriptionClient::new(reqwest::Client::new(), server.url("/api/transcribe-audio"));

        let result = client.transcribe(Some(clip())).await.expect("transcript");

        assert_eq!(result.text, "hello there");
        assert_eq!(result.language.as_deref(), Some("en"));
        assert_eq!(result.duration_seconds, 1.2);
        let segments = result.segments.expect("segments");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].start_seconds, 0.5);

        let requests = server.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/api/transcribe-audio");
        assert!(requests[0]
            .header("content-type")
            .is_some_and(|v| v.starts_with("multipart/form-data")));
        let body = requests[0].body_text();
        assert!(body.contains(r#"name="audio""#));
        assert!(body.contains(r#"filename="clip.mp3""#));
        assert!(body.contains("ID3fakeaudio"));
    }

    #[tokio::test]
    async fn endpoint_error_message_is_surfaced() {
        let server = FixtureServer::start(vec![FixtureResponse::json(
            500,
            r#"{"error":"Internal Server Error"}"#,
        )])
        .await;
        let client = TranscriptionClient::new(reqwest::Client::new(), server.url("/api/transcribe-audio"));

        let err = client.transcribe(Some(clip())).await.expect_err("500");

        assert!(matches!(err, TranscriptionError::Status { status: 500, .. }));
        assert_eq!(err.to_string(), "Internal Server Error");
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_decode_error() {
        let server =
            FixtureServer::start(vec![FixtureResponse::json(200, r#"{"result":"?"}"#)]).await;
        let client = TranscriptionClient::new(reqwest::Client::new(), server.url("/api/transcribe-audio"));

        let err = client.transcribe(Some(clip())).await.expect_err("decode");

        assert!(matches!(err, TranscriptionError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let url = FixtureServer::unused_url("/api/transcribe-audio").await;
        let client = TranscriptionClient::new(reqwest::Client::new(), url);

        let err = client.transcribe(Some(clip())).await.expect_err("network");

        assert!(matches!(err, TranscriptionError::Network(_)));
    }

    #[test]
    fn selection_refuses_more_than_one_file() {
        let mut selection = AudioSelection::default();
        selection.select(vec![clip()]).expect("one file");

        let err = selection
            .select(vec![clip(), clip()])
            .expect_err("two files");

        assert_eq!(err, ValidationError::TooManyAudioFiles(2));
        assert_eq!(err.to_string(), "You can only upload one audio file.");
        assert_eq!(selection.selected(), Some(&clip()));
    }

    #[tokio::test]
    async fn selection_clears_only_after_success() {
        let server = FixtureServer::start(vec![
            FixtureResponse::json(500, r#"{"error":"Internal Server Error"}"#),
            FixtureResponse::json(200, SUCCESS),
        ])
        .await;
        let client = TranscriptionClient::new(reqwest::Client::new(), server.url("/api/transcribe-audio"));
        let mut selection = AudioSelection::default();
        selection.select(vec![clip()]).expect("select");

        selection
            .transcribe_with(&client)
            .await
            .expect_err("first attempt fails");
        assert!(selection.selected().is_some());

        let result = selection.transcribe_with(&client).await.expect("retry");
        assert_eq!(result.text, "hello there");
        assert!(selection.selected().is_none());
    }
}
