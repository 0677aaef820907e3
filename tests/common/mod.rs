//! In-memory stand-ins for the catalog service and the encoder.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use mediagrab::catalog::{Catalog, RemoteStream, Resolved};
use mediagrab::media::{Collection, CollectionEntry, MediaItem, Representation, RepresentationKind};
use mediagrab::tool::{MediaTool, ToolOutput};
use mediagrab::{Error, ProgressEvent, ProgressSink, Result};

pub const THUMBNAIL_BYTES: &[u8] = b"\xff\xd8\xff-jpeg";

#[derive(Default)]
pub struct FakeCatalog {
    items: HashMap<String, Resolved>,
    collections: HashMap<String, Collection>,
    payloads: HashMap<String, Vec<u8>>,
    broken: HashSet<String>,
    pub thumbnails: bool,
    opened: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            thumbnails: true,
            ..Self::default()
        }
    }

    /// Register an item at `url`; every representation serves `<id>-bytes` as its payload.
    pub fn with_item(
        mut self,
        url: &str,
        title: &str,
        representations: Vec<Representation>,
    ) -> Self {
        for rep in &representations {
            self.payloads
                .insert(rep.source.clone(), format!("{}-bytes", rep.id).into_bytes());
        }
        self.items.insert(
            url.to_owned(),
            Resolved {
                item: MediaItem {
                    url: url.to_owned(),
                    title: title.to_owned(),
                    author: "Some Channel".to_owned(),
                    duration_seconds: 187,
                    thumbnail_url: Some(format!("{url}/thumb.jpg")),
                },
                representations,
            },
        );
        self
    }

    pub fn with_collection(mut self, url: &str, title: &str, members: &[(&str, &str)]) -> Self {
        self.collections.insert(
            url.to_owned(),
            Collection {
                title: title.to_owned(),
                entries: members
                    .iter()
                    .map(|(url, title)| CollectionEntry {
                        url: (*url).to_owned(),
                        title: (*title).to_owned(),
                    })
                    .collect(),
            },
        );
        self
    }

    /// Make the representation `id` drop its connection halfway through the transfer.
    pub fn with_broken_stream(mut self, id: &str) -> Self {
        self.broken.insert(format!("mem://{id}"));
        self
    }

    pub fn without_thumbnails(mut self) -> Self {
        self.thumbnails = false;
        self
    }

    /// Sources opened so far, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl Catalog for FakeCatalog {
    fn resolve(&self, url: &str) -> Result<Resolved> {
        self.items
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("video unavailable: {url}")))
    }

    fn resolve_collection(&self, url: &str) -> Result<Collection> {
        self.collections
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("playlist unavailable: {url}")))
    }

    fn open(&self, representation: &Representation) -> Result<RemoteStream> {
        self.opened.lock().unwrap().push(representation.source.clone());
        let bytes = self
            .payloads
            .get(&representation.source)
            .cloned()
            .ok_or_else(|| Error::Transfer("connection reset".to_owned()))?;
        let len = bytes.len() as u64;
        if self.broken.contains(&representation.source) {
            let half = bytes.len() / 2;
            return Ok(RemoteStream::new(
                DropsAfter {
                    inner: Cursor::new(bytes),
                    remaining: half,
                },
                Some(len),
            ));
        }
        Ok(RemoteStream::new(Cursor::new(bytes), Some(len)))
    }

    fn open_thumbnail(&self, _item: &MediaItem) -> Result<RemoteStream> {
        if !self.thumbnails {
            return Err(Error::Transfer("thumbnail unavailable".to_owned()));
        }
        Ok(RemoteStream::new(
            Cursor::new(THUMBNAIL_BYTES.to_vec()),
            Some(THUMBNAIL_BYTES.len() as u64),
        ))
    }
}

/// Serves `remaining` bytes, then fails like a reset connection.
struct DropsAfter {
    inner: Cursor<Vec<u8>>,
    remaining: usize,
}

impl Read for DropsAfter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ));
        }
        let want = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..want])?;
        self.remaining -= n;
        Ok(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolBehavior {
    /// Write `encoded` to the output path and exit 0.
    Succeed,
    /// Exit non-zero without writing anything.
    Fail,
    /// Exit 0 but leave the output empty.
    EmptyOutput,
}

/// Encoder double: treats the last argument as the output path.
pub struct FakeTool {
    behavior: ToolBehavior,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeTool {
    pub fn new(behavior: ToolBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl MediaTool for FakeTool {
    fn run(&self, args: &[String], _timeout: Duration) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        match self.behavior {
            ToolBehavior::Succeed => {
                if let Some(out) = args.last() {
                    fs::write(out, b"encoded")?;
                }
                Ok(ToolOutput {
                    success: true,
                    stderr: String::new(),
                })
            }
            ToolBehavior::Fail => Ok(ToolOutput {
                success: false,
                stderr: "Invalid data found when processing input".to_owned(),
            }),
            ToolBehavior::EmptyOutput => Ok(ToolOutput {
                success: true,
                stderr: String::new(),
            }),
        }
    }
}

/// Collects every progress event.
#[derive(Default)]
pub struct Recorder(Mutex<Vec<ProgressEvent>>);

impl Recorder {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }

    /// `(message, percent)` for every event that carries a percentage.
    pub fn checkpoints(&self) -> Vec<(String, u8)> {
        self.events()
            .into_iter()
            .filter_map(|e| e.percent.map(|p| (e.message, p)))
            .collect()
    }
}

impl ProgressSink for Recorder {
    fn notify(&self, event: &ProgressEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

pub fn video(id: &str, height: u32, container: &str) -> Representation {
    rep(id, RepresentationKind::Video, container, Some(height), None)
}

pub fn audio(id: &str, kbps: u32) -> Representation {
    rep(id, RepresentationKind::Audio, "webm", None, Some(kbps))
}

pub fn progressive(id: &str, height: u32, container: &str) -> Representation {
    rep(id, RepresentationKind::Progressive, container, Some(height), Some(128))
}

fn rep(
    id: &str,
    kind: RepresentationKind,
    container: &str,
    height: Option<u32>,
    bitrate_kbps: Option<u32>,
) -> Representation {
    Representation {
        id: id.to_owned(),
        kind,
        container: container.to_owned(),
        height,
        bitrate_kbps,
        size_bytes: None,
        source: format!("mem://{id}"),
    }
}

/// Sorted file names in `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
