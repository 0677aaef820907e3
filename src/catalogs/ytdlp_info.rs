use serde::Deserialize;

use crate::media::{Collection, CollectionEntry, MediaItem, Representation, RepresentationKind};

/// The subset of `yt-dlp -J` output for a single video that we use.
#[derive(Debug, Deserialize)]
pub struct InfoJson {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<FormatJson>,
}

#[derive(Debug, Deserialize)]
pub struct FormatJson {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub abr: Option<f64>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

/// `yt-dlp -J --flat-playlist` output for a playlist.
#[derive(Debug, Deserialize)]
pub struct PlaylistJson {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub entries: Vec<EntryJson>,
}

#[derive(Debug, Deserialize)]
pub struct EntryJson {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl InfoJson {
    pub fn into_item(self, url: &str) -> (MediaItem, Vec<Representation>) {
        let representations = self
            .formats
            .into_iter()
            .filter_map(FormatJson::into_representation)
            .collect();

        let item = MediaItem {
            url: url.to_owned(),
            title: self.title.unwrap_or_default(),
            author: self.uploader.or(self.channel).unwrap_or_default(),
            duration_seconds: self.duration.map(|d| d.max(0.0) as u64).unwrap_or(0),
            thumbnail_url: self.thumbnail,
        };
        (item, representations)
    }
}

impl FormatJson {
    /// Classify a format by its codecs. Formats with neither stream (storyboards) or without a
    /// direct URL are dropped.
    pub fn into_representation(self) -> Option<Representation> {
        let source = self.url?;
        let has_video = match self.vcodec.as_deref() {
            Some("none") => false,
            Some(_) => true,
            None => self.height.is_some(),
        };
        let has_audio = matches!(self.acodec.as_deref(), Some(codec) if codec != "none");

        let kind = match (has_video, has_audio) {
            (true, true) => RepresentationKind::Progressive,
            (true, false) => RepresentationKind::Video,
            (false, true) => RepresentationKind::Audio,
            (false, false) => return None,
        };

        Some(Representation {
            id: self.format_id,
            kind,
            container: self.ext.unwrap_or_else(|| "bin".to_owned()),
            height: if has_video { self.height } else { None },
            bitrate_kbps: self.abr.map(|abr| abr.round() as u32),
            size_bytes: self.filesize.or(self.filesize_approx),
            source,
        })
    }
}

impl PlaylistJson {
    pub fn into_collection(self) -> Collection {
        let entries = self
            .entries
            .into_iter()
            .filter_map(|entry| {
                let url = entry
                    .url
                    .filter(|u| u.starts_with("http"))
                    .or(entry.webpage_url)
                    .or_else(|| {
                        entry
                            .id
                            .as_ref()
                            .map(|id| format!("https://www.youtube.com/watch?v={id}"))
                    })?;
                Some(CollectionEntry {
                    url,
                    title: entry.title.unwrap_or_default(),
                })
            })
            .collect();

        Collection {
            title: self.title.unwrap_or_default(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_JSON: &str = r#"{
        "id": "abcdEFGH123",
        "title": "Rust in 100 Seconds",
        "uploader": "Fireship",
        "duration": 127.4,
        "thumbnail": "https://i.ytimg.com/vi/abcdEFGH123/maxresdefault.jpg",
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none", "url": "https://sb"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.478, "filesize": 2000, "url": "https://a140"},
            {"format_id": "251", "ext": "webm", "vcodec": "none", "acodec": "opus", "abr": 135.9, "filesize_approx": 2100, "url": "https://a251"},
            {"format_id": "136", "ext": "mp4", "vcodec": "avc1.4d401f", "acodec": "none", "height": 720, "url": "https://v136"},
            {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "url": "https://p18"},
            {"format_id": "nourl", "ext": "mp4", "vcodec": "avc1", "acodec": "none", "height": 1080}
        ]
    }"#;

    #[test]
    fn maps_formats_by_codec() -> anyhow::Result<()> {
        let info: InfoJson = serde_json::from_str(VIDEO_JSON)?;
        let (item, reps) = info.into_item("https://www.youtube.com/watch?v=abcdEFGH123");

        assert_eq!(item.title, "Rust in 100 Seconds");
        assert_eq!(item.author, "Fireship");
        assert_eq!(item.duration_seconds, 127);

        let kinds: Vec<(&str, RepresentationKind)> =
            reps.iter().map(|r| (r.id.as_str(), r.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("140", RepresentationKind::Audio),
                ("251", RepresentationKind::Audio),
                ("136", RepresentationKind::Video),
                ("18", RepresentationKind::Progressive),
            ]
        );

        let opus = &reps[1];
        assert_eq!(opus.bitrate_kbps, Some(136));
        assert_eq!(opus.size_bytes, Some(2100));
        assert_eq!(opus.container, "webm");
        Ok(())
    }

    #[test]
    fn flat_playlist_entries_keep_order_and_build_urls() -> anyhow::Result<()> {
        let json = r#"{
            "title": "Mix",
            "entries": [
                {"id": "a1", "url": "https://www.youtube.com/watch?v=a1", "title": "First"},
                {"id": "b2", "url": "b2", "title": "Second"},
                {"title": "no locator at all"}
            ]
        }"#;
        let collection = serde_json::from_str::<PlaylistJson>(json)?.into_collection();

        assert_eq!(collection.title, "Mix");
        assert_eq!(collection.entries.len(), 2);
        assert_eq!(collection.entries[0].url, "https://www.youtube.com/watch?v=a1");
        assert_eq!(collection.entries[1].url, "https://www.youtube.com/watch?v=b2");
        assert_eq!(collection.entries[1].title, "Second");
        Ok(())
    }
}
