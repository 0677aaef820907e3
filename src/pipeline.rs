//! High-level API for running downloads.
//!
//! We expose a single entry point (`Pipeline`) that both front ends share. It wires up
//! catalog lookup → representation selection → acquisition → merge/convert → naming, and reports
//! every checkpoint to a caller-supplied [`ProgressSink`].
//!
//! The intent is:
//! - We build the pipeline once, with an explicit [`Config`] (no ambient output directory).
//! - We reuse it across many runs, possibly from several worker threads at once.
//! - No run ever returns an error: every failure is folded into the [`DownloadResult`].

use std::fs;
use std::path::{Path, PathBuf};

use crate::acquire;
use crate::catalog::{Catalog, Resolved};
use crate::config::Config;
use crate::filename::{bounded_stem, claim_unique};
use crate::media::{
    DownloadRequest, DownloadResult, MediaItem, QualityTarget, Representation, ResultKind,
};
use crate::merge;
use crate::normalize::{is_collection_url, normalize_url};
use crate::progress::{Band, ProgressEvent, ProgressSink};
use crate::selector::{self, Selection};
use crate::tool::MediaTool;
use crate::{Error, Result};

/// Container of merged adaptive downloads (AAC audio is re-encoded into it).
const MERGED_CONTAINER: &str = "mp4";

/// Container of audio-only deliverables.
const AUDIO_CONTAINER: &str = "mp3";

const THUMBNAIL_EXTENSION: &str = "jpg";

/// The download pipeline.
///
/// `Pipeline` owns the long-lived collaborators a run needs:
/// - a [`Catalog`] that resolves identifiers and opens byte streams
/// - a [`MediaTool`] that merges and converts
/// - the [`Config`] naming the output and scratch directories
///
/// Everything is borrowed immutably during a run, so one `Pipeline` can be shared across threads
/// (e.g. behind an `Arc`) as long as the collaborators are `Sync`.
pub struct Pipeline<C: Catalog, T: MediaTool> {
    catalog: C,
    tool: T,
    config: Config,
}

impl<C: Catalog, T: MediaTool> Pipeline<C, T> {
    pub fn new(catalog: C, tool: T, config: Config) -> Self {
        Self {
            catalog,
            tool,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Normalize the request URL and run the single-item or collection pipeline.
    pub fn run(&self, request: &DownloadRequest, sink: &dyn ProgressSink) -> DownloadResult {
        let url = match normalize_url(&request.url) {
            Ok(url) => url,
            Err(err) => return fail(sink, kind_for(request.target), &err),
        };

        if is_collection_url(&url) {
            self.download_collection(&url, request.target, sink)
        } else {
            self.download(&url, request.target, sink)
        }
    }

    /// Download one item identified by an already-normalized URL.
    pub fn download(
        &self,
        url: &str,
        target: QualityTarget,
        sink: &dyn ProgressSink,
    ) -> DownloadResult {
        let _span = tracing::info_span!("download", %url, %target).entered();

        match self.download_item(url, target, sink) {
            Ok((kind, path)) => {
                sink.notify(&ProgressEvent::new("Download complete!", 100));
                tracing::info!(output = %path.display(), "download complete");
                DownloadResult::completed(kind, file_name(&path))
            }
            Err(err @ Error::MergeFailed { .. }) => {
                // Both streams are on disk, only the merge is missing.
                tracing::warn!(error = %err, "merge failed, sources kept");
                sink.notify(&ProgressEvent::new("Merge failed, but files saved", 100));
                DownloadResult::failed(ResultKind::Video, &err)
            }
            Err(err) => fail(sink, kind_for(target), &err),
        }
    }

    /// Download every member of a collection, in catalog order.
    ///
    /// One failing member never stops the others; its failure is recorded in its own result.
    pub fn download_collection(
        &self,
        url: &str,
        target: QualityTarget,
        sink: &dyn ProgressSink,
    ) -> DownloadResult {
        let _span = tracing::info_span!("collection", %url, %target).entered();

        sink.notify(&ProgressEvent::new("Fetching playlist information...", 0));
        let collection = match self.catalog.resolve_collection(url) {
            Ok(collection) => collection,
            Err(err) => return fail(sink, ResultKind::Playlist, &as_catalog_error(err)),
        };

        let total = collection.entries.len();
        sink.notify(&ProgressEvent::new(
            format!("Playlist: {} ({total} videos)", collection.title),
            5,
        ));

        let mut results = Vec::with_capacity(total);
        for (idx, entry) in collection.entries.iter().enumerate() {
            let position = idx + 1;
            let percent = (position * 90 / total) as u8;
            sink.notify(&ProgressEvent::new(
                format!("[{position}/{total}] {}", entry.title),
                percent,
            ));

            let member_url = normalize_url(&entry.url).unwrap_or_else(|_| entry.url.clone());
            let result = self.download(&member_url, target, sink);
            if !result.success {
                tracing::warn!(
                    position,
                    url = %member_url,
                    error = ?result.error,
                    "playlist item failed"
                );
            }
            results.push(result);
        }

        sink.notify(&ProgressEvent::new("Playlist download complete!", 100));
        DownloadResult::collection(results)
    }

    fn download_item(
        &self,
        url: &str,
        target: QualityTarget,
        sink: &dyn ProgressSink,
    ) -> Result<(ResultKind, PathBuf)> {
        self.config.ensure_dirs()?;

        sink.notify(&ProgressEvent::new("Fetching video information...", 0));
        let Resolved {
            item,
            representations,
        } = self.catalog.resolve(url).map_err(as_catalog_error)?;

        sink.notify(
            &ProgressEvent::new(format!("Processing: {}", item.title), 10)
                .with_item(item.summary()),
        );
        let resolutions = selector::available_resolutions(&representations);
        tracing::info!(title = %item.title, ?resolutions, "resolved");
        if !target.is_audio_only() && !resolutions.is_empty() {
            let labels: Vec<String> = resolutions.iter().map(|h| format!("{h}p")).collect();
            sink.notify(&ProgressEvent::message(format!(
                "Available resolutions: {}",
                labels.join(", ")
            )));
        }

        let selection =
            selector::select(&representations, target, &self.config.preferred_container)?;
        let stem = bounded_stem(&item.title);

        let (kind, output) = match selection {
            Selection::AudioOnly(audio) => {
                (ResultKind::Audio, self.fetch_audio_only(&audio, &stem, sink)?)
            }
            Selection::Merge { video, audio } => (
                ResultKind::Video,
                self.fetch_and_merge(&video, &audio, &stem, sink)?,
            ),
            Selection::Progressive(rep) => {
                (ResultKind::Video, self.fetch_progressive(&rep, &stem, sink)?)
            }
        };

        self.save_thumbnail(&item, &output);
        Ok((kind, output))
    }

    fn fetch_audio_only(
        &self,
        audio: &Representation,
        stem: &str,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        // Output first, so an mp3 source never takes the deliverable's name.
        let output = claim_unique(
            &self
                .config
                .output_dir
                .join(format!("{stem}.{AUDIO_CONTAINER}")),
        )?;
        let input = match claim_unique(
            &self
                .config
                .output_dir
                .join(format!("{stem}.{}", audio.container)),
        ) {
            Ok(input) => input,
            Err(err) => {
                discard_placeholder(&output);
                return Err(err);
            }
        };

        sink.notify(&ProgressEvent::new("Downloading audio only...", 20));
        let fetched = {
            let mut band = Band::new(sink, "Downloading audio", 20, 80);
            acquire::fetch_to(&self.catalog, audio, &input, &mut |p| band.report(p))
        };
        if let Err(err) = fetched {
            discard_placeholder(&input);
            discard_placeholder(&output);
            return Err(err);
        }

        sink.notify(&ProgressEvent::new("Converting to MP3...", 80));
        let timeout = self.config.conversion_timeout;
        if let Err(err) = merge::convert_to_audio_only(&self.tool, &input, &output, timeout) {
            discard_placeholder(&output);
            tracing::warn!(input = %input.display(), "conversion failed, download kept");
            return Err(err);
        }
        Ok(output)
    }

    fn fetch_and_merge(
        &self,
        video: &Representation,
        audio: &Representation,
        stem: &str,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        // Sequential on purpose: video fills 30-60, audio fills 60-85.
        sink.notify(&ProgressEvent::new(
            format!("Downloading video ({})...", video.resolution_label()),
            30,
        ));
        let video_path = {
            let mut band = Band::new(sink, "Downloading video", 30, 60);
            acquire::fetch(
                &self.catalog,
                video,
                &self.config.scratch_dir,
                "video_",
                &mut |p| band.report(p),
            )?
        };

        sink.notify(&ProgressEvent::new(
            format!("Downloading audio ({})...", audio.bitrate_label()),
            60,
        ));
        let audio_path = {
            let mut band = Band::new(sink, "Downloading audio", 60, 85);
            acquire::fetch(
                &self.catalog,
                audio,
                &self.config.scratch_dir,
                "audio_",
                &mut |p| band.report(p),
            )?
        };

        let output = claim_unique(&self.config.output_dir.join(format!(
            "{stem} ({}).{MERGED_CONTAINER}",
            video.resolution_label()
        )))?;

        sink.notify(&ProgressEvent::new("Merging audio and video...", 85));
        if let Err(err) = merge::merge(
            &self.tool,
            &video_path,
            &audio_path,
            &output,
            self.config.conversion_timeout,
        ) {
            discard_placeholder(&output);
            return Err(err);
        }
        Ok(output)
    }

    fn fetch_progressive(
        &self,
        rep: &Representation,
        stem: &str,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        sink.notify(&ProgressEvent::new("Using progressive stream fallback...", 30));

        let name = match rep.height {
            Some(_) => format!("{stem} ({}).{}", rep.resolution_label(), rep.container),
            None => format!("{stem}.{}", rep.container),
        };
        let output = claim_unique(&self.config.output_dir.join(name))?;

        let mut band = Band::new(sink, "Downloading", 30, 85);
        let fetched = acquire::fetch_to(&self.catalog, rep, &output, &mut |p| band.report(p));
        if let Err(err) = fetched {
            discard_placeholder(&output);
            return Err(err);
        }
        Ok(output)
    }

    /// Best-effort: save the item's thumbnail next to `output`. Failures are only logged.
    fn save_thumbnail(&self, item: &MediaItem, output: &Path) {
        if !self.config.save_thumbnails {
            return;
        }

        // Outputs sharing a stem share one thumbnail; the first one written stays.
        let thumb_path = output.with_extension(THUMBNAIL_EXTENSION);
        if thumb_path.exists() {
            tracing::debug!(path = %thumb_path.display(), "thumbnail already present");
            return;
        }
        let saved = self.catalog.open_thumbnail(item).and_then(|stream| {
            acquire::write_stream(stream.reader, stream.total_bytes, &thumb_path, &mut |_| {})
        });

        match saved {
            Ok(()) => tracing::debug!(path = %thumb_path.display(), "thumbnail saved"),
            Err(err) => tracing::warn!(error = %err, "failed to save thumbnail"),
        }
    }
}

fn fail(sink: &dyn ProgressSink, kind: ResultKind, err: &Error) -> DownloadResult {
    tracing::error!(error = %err, "download failed");
    sink.notify(&ProgressEvent::new(format!("Error: {err}"), 0));
    DownloadResult::failed(kind, err)
}

fn kind_for(target: QualityTarget) -> ResultKind {
    if target.is_audio_only() {
        ResultKind::Audio
    } else {
        ResultKind::Video
    }
}

/// Anything the catalog raises during lookup counts as a catalog failure.
fn as_catalog_error(err: Error) -> Error {
    match err {
        Error::Catalog(_) => err,
        other => Error::Catalog(other.to_string()),
    }
}

/// Remove a claimed output path that never received real content.
fn discard_placeholder(path: &Path) {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove placeholder");
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
