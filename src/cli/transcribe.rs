//! "transcribe" command

use std::error::Error;
use std::path::PathBuf;

use crate::cli::build_transcription_client;
use crate::core::attachments::Attachment;
use crate::core::config::Config;
use crate::core::transcription::{AudioSelection, TranscriptResult};

pub async fn run_transcribe(
    config: &Config,
    file: PathBuf,
    segments: bool,
) -> Result<(), Box<dyn Error>> {
    let client = build_transcription_client(config)?;
    let audio = Attachment::from_path(&file)
        .await
        .map_err(|err| format!("Cannot read {}: {err}", file.display()))?;

    let mut selection = AudioSelection::default();
    selection.select(vec![audio])?;
    let result = selection.transcribe_with(&client).await?;

    for line in format_transcript(&result, segments) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_transcript(result: &TranscriptResult, with_segments: bool) -> Vec<String> {
    let mut lines = vec![result.text.trim().to_string()];
    if !with_segments {
        return lines;
    }

    if let Some(language) = &result.language {
        lines.push(format!("language: {language}"));
    }
    lines.push(format!("duration: {:.2}s", result.duration_seconds));
    for segment in result.segments.iter().flatten() {
        lines.push(format!(
            "[{:>7.2} - {:>7.2}] {}",
            segment.start_seconds,
            segment.end_seconds,
            segment.text.trim()
        ));
    }
    lines
}
