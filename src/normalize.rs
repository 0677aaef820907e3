//! Canonicalize user-supplied media identifiers into the form the catalog expects.

use std::sync::OnceLock;

use regex::Regex;

use crate::{Error, Result};

const WATCH_MARKER: &str = "watch?v=";
const CANONICAL_WATCH_PREFIX: &str = "https://www.youtube.com/watch?v=";

fn short_link() -> &'static Regex {
    static SHORT_LINK: OnceLock<Regex> = OnceLock::new();
    SHORT_LINK.get_or_init(|| {
        Regex::new(r"^https?://youtu\.be/([A-Za-z0-9_-]{11})").expect("short-link pattern is valid")
    })
}

/// Normalize a media URL.
///
/// Rules, first match wins:
/// - short links (`youtu.be/<11-char id>`) become the canonical watch URL for that id
/// - canonical watch URLs lose everything from the first `&` onwards
/// - anything else passes through unchanged
pub fn normalize_url(raw: &str) -> Result<String> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(Error::InvalidInput("URL is required".to_owned()));
    }

    if let Some(caps) = short_link().captures(url) {
        return Ok(format!("{CANONICAL_WATCH_PREFIX}{}", &caps[1]));
    }

    if let Some(marker) = url.find(WATCH_MARKER) {
        let tail_start = marker + WATCH_MARKER.len();
        if let Some(amp) = url[tail_start..].find('&') {
            return Ok(url[..tail_start + amp].to_owned());
        }
    }

    Ok(url.to_owned())
}

/// Whether `url` names a collection (playlist) rather than a single item.
///
/// Meant to be called on normalized URLs: a watch URL with a `list=` parameter has already been
/// reduced to the single video by [`normalize_url`].
pub fn is_collection_url(url: &str) -> bool {
    url.contains("playlist")
}
