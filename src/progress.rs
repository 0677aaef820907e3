use serde::{Deserialize, Serialize};

use crate::media::MediaSummary;

/// A progress checkpoint emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    #[serde(rename = "progress", default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(rename = "video_info", default, skip_serializing_if = "Option::is_none")]
    pub item: Option<MediaSummary>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>, percent: u8) -> Self {
        Self {
            message: message.into(),
            percent: Some(percent.min(100)),
            item: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            percent: None,
            item: None,
        }
    }

    pub fn with_item(mut self, item: MediaSummary) -> Self {
        self.item = Some(item);
        self
    }
}

/// Where the pipeline reports progress.
///
/// Calls happen synchronously on the pipeline's thread, so implementations should hand events off
/// quickly (print, push into a channel) rather than block. Delivery is best-effort: there is no
/// acknowledgment and nothing is replayed.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: &ProgressEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn notify(&self, _event: &ProgressEvent) {}
}

/// Forwards events to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn notify(&self, event: &ProgressEvent) {
        tracing::info!(
            message = %event.message,
            percent = event.percent,
            title = event.item.as_ref().map(|i| i.title.as_str()),
            "progress"
        );
    }
}

/// Adapts a closure into a [`ProgressSink`].
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn notify(&self, event: &ProgressEvent) {
        (self.0)(event)
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
    fn notify(&self, event: &ProgressEvent) {
        (**self).notify(event)
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for std::sync::Arc<S> {
    fn notify(&self, event: &ProgressEvent) {
        (**self).notify(event)
    }
}

/// Maps a 0–100 transfer percentage into a sub-range of the overall run.
///
/// The pipeline reports two back-to-back downloads as e.g. 30–60 and 60–85; this keeps the
/// overall percentage monotonic and skips repeats of the same value.
pub(crate) struct Band<'a> {
    sink: &'a dyn ProgressSink,
    label: &'a str,
    start: u8,
    end: u8,
    last: Option<u8>,
}

impl<'a> Band<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, label: &'a str, start: u8, end: u8) -> Self {
        Self {
            sink,
            label,
            start,
            end: end.max(start),
            last: None,
        }
    }

    pub(crate) fn report(&mut self, transfer_percent: u8) {
        let span = u32::from(self.end - self.start);
        let overall = self.start + (span * u32::from(transfer_percent.min(100)) / 100) as u8;
        if self.last == Some(overall) {
            return;
        }
        self.last = Some(overall);
        self.sink.notify(&ProgressEvent::new(
            format!("{}... {transfer_percent}%", self.label),
            overall,
        ));
    }
}
