//! Data model shared by the catalog, the selector and the pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// One downloadable unit, as resolved by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Normalized URL the item was resolved from.
    pub url: String,
    pub title: String,
    pub author: String,
    pub duration_seconds: u64,
    pub thumbnail_url: Option<String>,
}

/// The part of a [`MediaItem`] we show to progress listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSummary {
    pub title: String,
    pub author: String,
    /// Human-readable duration, e.g. `"3m 7s"`.
    pub duration: String,
    pub thumbnail: Option<String>,
}

impl MediaItem {
    pub fn summary(&self) -> MediaSummary {
        MediaSummary {
            title: self.title.clone(),
            author: self.author.clone(),
            duration: format!(
                "{}m {}s",
                self.duration_seconds / 60,
                self.duration_seconds % 60
            ),
            thumbnail: self.thumbnail_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentationKind {
    /// Video elementary stream only (adaptive).
    Video,
    /// Audio elementary stream only (adaptive).
    Audio,
    /// Audio and video already multiplexed together.
    Progressive,
}

/// One encoded variant of a media item.
///
/// Representations come from the catalog; the pipeline only filters, sorts and picks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    /// Catalog-specific identifier (e.g. a yt-dlp `format_id`).
    pub id: String,
    pub kind: RepresentationKind,
    /// File extension of the container, without the dot.
    pub container: String,
    /// Vertical resolution in pixels, for video and progressive streams.
    pub height: Option<u32>,
    /// Average audio bitrate in kbit/s.
    pub bitrate_kbps: Option<u32>,
    /// Approximate size in bytes, when the catalog knows it.
    pub size_bytes: Option<u64>,
    /// Opaque locator the catalog understands when asked to open this stream.
    pub source: String,
}

impl Representation {
    /// `"720p"`, or `"?p"` when the catalog did not report a height.
    pub fn resolution_label(&self) -> String {
        match self.height {
            Some(h) => format!("{h}p"),
            None => "?p".to_owned(),
        }
    }

    /// `"160kbps"`, or `"?kbps"` when unknown.
    pub fn bitrate_label(&self) -> String {
        match self.bitrate_kbps {
            Some(b) => format!("{b}kbps"),
            None => "?kbps".to_owned(),
        }
    }
}

/// The quality a caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTarget {
    /// Highest acceptable video height in pixels.
    Ceiling(u32),
    /// Audio only; no video stream may be selected.
    AudioOnly,
}

impl QualityTarget {
    pub const DEFAULT_CEILING: u32 = 720;

    /// Build a target from front-end inputs: a ceiling string like `"720"`/`"720p"` and a flag.
    pub fn from_parts(quality: Option<&str>, audio_only: bool) -> crate::Result<Self> {
        if audio_only {
            return Ok(Self::AudioOnly);
        }
        match quality.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => q.parse(),
            None => Ok(Self::default()),
        }
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(self, Self::AudioOnly)
    }
}

impl Default for QualityTarget {
    fn default() -> Self {
        Self::Ceiling(Self::DEFAULT_CEILING)
    }
}

impl FromStr for QualityTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("audio") {
            return Ok(Self::AudioOnly);
        }
        let digits = trimmed.strip_suffix(['p', 'P']).unwrap_or(trimmed);
        digits
            .parse::<u32>()
            .map(Self::Ceiling)
            .map_err(|_| Error::InvalidInput(format!("unknown quality '{s}'")))
    }
}

impl fmt::Display for QualityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ceiling(h) => write!(f, "{h}p"),
            Self::AudioOnly => f.write_str("audio"),
        }
    }
}

/// One top-level unit of work submitted by a front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub target: QualityTarget,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, target: QualityTarget) -> Self {
        Self {
            url: url.into(),
            target,
        }
    }
}

/// A collection (playlist) as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub title: String,
    pub entries: Vec<CollectionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Video,
    Audio,
    Playlist,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: ResultKind,
    /// File name (not path) of the produced file, relative to the output directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Per-item results, in catalog order. Only populated for playlists.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<DownloadResult>,
}

impl DownloadResult {
    pub fn completed(kind: ResultKind, filename: impl Into<String>) -> Self {
        Self {
            success: true,
            kind,
            filename: Some(filename.into()),
            error: None,
            error_kind: None,
            results: Vec::new(),
        }
    }

    pub fn failed(kind: ResultKind, err: &Error) -> Self {
        Self {
            success: false,
            kind,
            filename: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            results: Vec::new(),
        }
    }

    pub fn collection(results: Vec<DownloadResult>) -> Self {
        Self {
            success: true,
            kind: ResultKind::Playlist,
            filename: None,
            error: None,
            error_kind: None,
            results,
        }
    }
}
