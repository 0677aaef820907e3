//! Combine adaptive streams into one deliverable, or convert audio into the audio deliverable.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::tool::MediaTool;
use crate::{Error, Result};

/// How much of the tool's stderr we surface in user-facing messages.
const STDERR_EXCERPT_CHARS: usize = 100;

/// Arguments for: copy the video stream, re-encode audio to AAC with loudness normalization.
pub fn merge_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_owned(),
        "-i".to_owned(),
        video.display().to_string(),
        "-i".to_owned(),
        audio.display().to_string(),
        "-c:v".to_owned(),
        "copy".to_owned(),
        "-c:a".to_owned(),
        "aac".to_owned(),
        "-filter:a".to_owned(),
        "loudnorm".to_owned(),
        output.display().to_string(),
    ]
}

/// Arguments for: extract the audio stream at best VBR quality into `output`'s container.
pub fn convert_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_owned(),
        "-i".to_owned(),
        input.display().to_string(),
        "-q:a".to_owned(),
        "0".to_owned(),
        "-map".to_owned(),
        "a".to_owned(),
        output.display().to_string(),
    ]
}

/// Merge `video` and `audio` into `output`.
///
/// On success both sources are deleted. On any failure (non-zero exit, start failure, timeout)
/// both sources stay where they are and we return [`Error::MergeFailed`] naming them.
pub fn merge(
    tool: &dyn MediaTool,
    video: &Path,
    audio: &Path,
    output: &Path,
    timeout: Duration,
) -> Result<()> {
    let reason = match tool.run(&merge_args(video, audio, output), timeout) {
        Ok(out) if out.success => None,
        Ok(out) => Some(format!("encoder exited with an error: {}", excerpt(&out.stderr))),
        Err(err) => Some(err.to_string()),
    };

    if let Some(reason) = reason {
        return Err(Error::MergeFailed {
            video: video.to_path_buf(),
            audio: audio.to_path_buf(),
            reason,
        });
    }

    for source in [video, audio] {
        if let Err(err) = fs::remove_file(source) {
            tracing::warn!(path = %source.display(), error = %err, "failed to remove merged source");
        }
    }
    Ok(())
}

/// Convert `input` into the audio-only deliverable at `output`.
///
/// A clean exit is not enough: the output must exist and be non-empty. An empty output is
/// removed and reported as [`Error::ConversionFailed`]. `input` is deleted only after that check
/// passes.
pub fn convert_to_audio_only(
    tool: &dyn MediaTool,
    input: &Path,
    output: &Path,
    timeout: Duration,
) -> Result<()> {
    let out = tool.run(&convert_args(input, output), timeout)?;
    if !out.success {
        tracing::error!(stderr = %out.stderr, "audio conversion failed");
        return Err(Error::ConversionFailed(format!(
            "audio conversion failed: {}",
            excerpt(&out.stderr)
        )));
    }

    let size = fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        let _ = fs::remove_file(output);
        return Err(Error::ConversionFailed(
            "conversion produced an empty file".to_owned(),
        ));
    }

    if let Err(err) = fs::remove_file(input) {
        tracing::warn!(path = %input.display(), error = %err, "failed to remove converted source");
    }
    Ok(())
}

fn excerpt(stderr: &str) -> String {
    stderr.trim().chars().take(STDERR_EXCERPT_CHARS).collect()
}
