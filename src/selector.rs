//! Pick which representations to fetch for a quality target.
//!
//! Selection is an ordered list of strategies. Each one either returns a [`Selection`] or
//! declines ("not applicable"), and the first match wins:
//!
//! 1. [`AudioOnlyStrategy`]: the best audio stream, only for audio-only targets.
//! 2. [`AdaptiveStrategy`]: the best video stream under the ceiling plus the best audio stream.
//! 3. [`ProgressiveStrategy`]: a single pre-muxed stream.
//!
//! Keeping each rung separate lets us test the fallback policy one step at a time.

use std::collections::BTreeSet;

use crate::media::{QualityTarget, Representation, RepresentationKind};
use crate::{Error, Result};

/// What the pipeline should fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Separate video and audio streams that must be merged.
    Merge {
        video: Representation,
        audio: Representation,
    },
    /// One pre-muxed stream, ready to use as-is.
    Progressive(Representation),
    /// One audio stream, to be converted into the audio deliverable.
    AudioOnly(Representation),
}

/// Inputs shared by every strategy.
pub struct SelectionInput<'a> {
    pub representations: &'a [Representation],
    pub target: QualityTarget,
    pub preferred_container: &'a str,
}

/// One rung of the fallback ladder.
pub trait SelectionStrategy {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Return a selection, or `None` when this strategy does not apply.
    fn select(&self, input: &SelectionInput<'_>) -> Option<Selection>;
}

pub struct AudioOnlyStrategy;

impl SelectionStrategy for AudioOnlyStrategy {
    fn name(&self) -> &'static str {
        "audio-only"
    }

    fn select(&self, input: &SelectionInput<'_>) -> Option<Selection> {
        if !input.target.is_audio_only() {
            return None;
        }
        best_audio(input.representations).map(|audio| Selection::AudioOnly(audio.clone()))
    }
}

pub struct AdaptiveStrategy;

impl SelectionStrategy for AdaptiveStrategy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn select(&self, input: &SelectionInput<'_>) -> Option<Selection> {
        let QualityTarget::Ceiling(ceiling) = input.target else {
            return None;
        };

        let mut videos: Vec<&Representation> = input
            .representations
            .iter()
            .filter(|r| r.kind == RepresentationKind::Video)
            .filter(|r| r.container.eq_ignore_ascii_case(input.preferred_container))
            .collect();
        sort_by_height_desc(&mut videos);

        // First at or under the ceiling; otherwise the tallest one even though it exceeds it.
        let video = videos
            .iter()
            .find(|r| r.height.unwrap_or(0) <= ceiling)
            .or_else(|| videos.first())?;
        let audio = best_audio(input.representations)?;

        Some(Selection::Merge {
            video: (*video).clone(),
            audio: audio.clone(),
        })
    }
}

pub struct ProgressiveStrategy;

impl SelectionStrategy for ProgressiveStrategy {
    fn name(&self) -> &'static str {
        "progressive"
    }

    fn select(&self, input: &SelectionInput<'_>) -> Option<Selection> {
        let QualityTarget::Ceiling(ceiling) = input.target else {
            return None;
        };

        let mut progressive: Vec<&Representation> = input
            .representations
            .iter()
            .filter(|r| r.kind == RepresentationKind::Progressive)
            .collect();
        sort_by_height_desc(&mut progressive);

        let exact = progressive.iter().find(|r| {
            r.height == Some(ceiling) && r.container.eq_ignore_ascii_case(input.preferred_container)
        });

        exact
            .or_else(|| progressive.first())
            .map(|r| Selection::Progressive((*r).clone()))
    }
}

/// The default strategy ladder, in the order it is tried.
pub fn default_strategies() -> Vec<Box<dyn SelectionStrategy + Send + Sync>> {
    vec![
        Box::new(AudioOnlyStrategy),
        Box::new(AdaptiveStrategy),
        Box::new(ProgressiveStrategy),
    ]
}

/// Run the default ladder.
pub fn select(
    representations: &[Representation],
    target: QualityTarget,
    preferred_container: &str,
) -> Result<Selection> {
    let strategies = default_strategies();
    select_with(
        strategies.iter().map(|s| s.as_ref() as &dyn SelectionStrategy),
        &SelectionInput {
            representations,
            target,
            preferred_container,
        },
    )
}

/// Run an explicit strategy list, first match wins.
pub fn select_with<'s>(
    strategies: impl IntoIterator<Item = &'s dyn SelectionStrategy>,
    input: &SelectionInput<'_>,
) -> Result<Selection> {
    for strategy in strategies {
        if let Some(selection) = strategy.select(input) {
            tracing::debug!(strategy = strategy.name(), "representation selected");
            return Ok(selection);
        }
    }

    let what = if input.target.is_audio_only() {
        "no audio stream found"
    } else {
        "no adaptive or progressive stream found"
    };
    Err(Error::NoStreamAvailable(what.to_owned()))
}

/// Distinct adaptive video heights, tallest first.
pub fn available_resolutions(representations: &[Representation]) -> Vec<u32> {
    let heights: BTreeSet<u32> = representations
        .iter()
        .filter(|r| r.kind == RepresentationKind::Video)
        .filter_map(|r| r.height)
        .collect();
    heights.into_iter().rev().collect()
}

fn best_audio(representations: &[Representation]) -> Option<&Representation> {
    // `max_by_key` keeps the last maximum; reverse first so ties resolve to catalog order.
    representations
        .iter()
        .rev()
        .filter(|r| r.kind == RepresentationKind::Audio)
        .max_by_key(|r| r.bitrate_kbps.unwrap_or(0))
}

fn sort_by_height_desc(reps: &mut [&Representation]) {
    // Stable sort: equal heights keep catalog order.
    reps.sort_by(|a, b| b.height.unwrap_or(0).cmp(&a.height.unwrap_or(0)));
}
