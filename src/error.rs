use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mediagrab's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Mediagrab's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs. Internals that talk to external processes still use
/// `anyhow` for context chains and are folded into one of these variants at the module boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// The identifier handed to the pipeline was empty or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The catalog service could not resolve the identifier.
    #[error("catalog lookup failed: {0}")]
    Catalog(String),

    /// Every selection strategy came up empty.
    #[error("no stream available: {0}")]
    NoStreamAvailable(String),

    /// Moving bytes from the remote to local storage failed.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The encoding tool failed or produced no usable output.
    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    /// The encoding tool did not finish within the configured budget.
    #[error("conversion timed out after {}s", .0.as_secs())]
    ConversionTimeout(Duration),

    /// Video and audio were downloaded but could not be combined. Both files are kept.
    #[error(
        "merge failed, files saved separately at '{}' and '{}': {reason}",
        .video.display(),
        .audio.display()
    )]
    MergeFailed {
        video: PathBuf,
        audio: PathBuf,
        reason: String,
    },

    /// The worker pool queue is full.
    #[error("download queue is full")]
    QueueFull,

    /// A background job died (panicked or lost its worker) before producing a result.
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Machine-readable classification of an [`Error`], carried in
/// [`DownloadResult`](crate::media::DownloadResult) payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    CatalogError,
    NoStreamAvailable,
    TransferError,
    ConversionFailed,
    ConversionTimeout,
    MergeFailed,
    QueueFull,
    Internal,
    Io,
}

impl Error {
    #[cfg(feature = "ytdlp")]
    pub(crate) fn catalog(err: anyhow::Error) -> Self {
        Self::Catalog(format!("{err:#}"))
    }

    pub(crate) fn transfer(err: impl std::fmt::Display) -> Self {
        Self::Transfer(err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Catalog(_) => ErrorKind::CatalogError,
            Self::NoStreamAvailable(_) => ErrorKind::NoStreamAvailable,
            Self::Transfer(_) => ErrorKind::TransferError,
            Self::ConversionFailed(_) => ErrorKind::ConversionFailed,
            Self::ConversionTimeout(_) => ErrorKind::ConversionTimeout,
            Self::MergeFailed { .. } => ErrorKind::MergeFailed,
            Self::QueueFull => ErrorKind::QueueFull,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}
