use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use reqwest::blocking::Client;

use crate::catalog::{Catalog, RemoteStream, Resolved};
use crate::catalogs::ytdlp_info::{InfoJson, PlaylistJson};
use crate::media::{Collection, MediaItem, Representation};
use crate::{Error, Result};

const USER_AGENT: &str = concat!("mediagrab/", env!("CARGO_PKG_VERSION"));

/// Catalog that asks `yt-dlp` for metadata and downloads format URLs over HTTP.
///
/// The HTTP client is built on first use. `reqwest`'s blocking client must not be created inside
/// an async runtime, and front ends construct the catalog there; the pipeline itself only ever
/// runs on plain worker threads.
pub struct YtDlpCatalog {
    program: PathBuf,
    client: OnceLock<std::result::Result<Client, String>>,
}

impl YtDlpCatalog {
    /// Use `yt-dlp` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("yt-dlp")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .get_or_init(|| {
                Client::builder()
                    .user_agent(USER_AGENT)
                    .build()
                    .map_err(|err| format!("failed to build HTTP client: {err}"))
            })
            .as_ref()
            .map_err(|msg| Error::Transfer(msg.clone()))
    }

    /// Run yt-dlp with `args` and return its stdout.
    fn dump_json(&self, args: &[&str]) -> anyhow::Result<String> {
        tracing::debug!(program = %self.program.display(), ?args, "running yt-dlp");
        let out = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("failed to run '{}'", self.program.display()))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(anyhow!(
                "yt-dlp exited with {}: {}",
                out.status,
                stderr.trim()
            ));
        }

        String::from_utf8(out.stdout).context("yt-dlp printed invalid UTF-8")
    }

    fn get(&self, url: &str) -> Result<RemoteStream> {
        let resp = self
            .client()?
            .get(url)
            .send()
            .map_err(|err| Error::Transfer(format!("request failed: {err}")))?
            .error_for_status()
            .map_err(|err| Error::Transfer(format!("bad status: {err}")))?;

        let total = resp.content_length();
        Ok(RemoteStream::new(resp, total))
    }
}

impl Default for YtDlpCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog for YtDlpCatalog {
    fn resolve(&self, url: &str) -> Result<Resolved> {
        let json = self
            .dump_json(&["-J", "--no-warnings", "--no-playlist", url])
            .map_err(Error::catalog)?;
        let info: InfoJson = serde_json::from_str(&json)
            .context("failed to parse yt-dlp video JSON")
            .map_err(Error::catalog)?;

        let (item, representations) = info.into_item(url);
        tracing::info!(
            title = %item.title,
            representations = representations.len(),
            "resolved media item"
        );
        Ok(Resolved {
            item,
            representations,
        })
    }

    fn resolve_collection(&self, url: &str) -> Result<Collection> {
        let json = self
            .dump_json(&["-J", "--flat-playlist", "--no-warnings", url])
            .map_err(Error::catalog)?;
        let playlist: PlaylistJson = serde_json::from_str(&json)
            .context("failed to parse yt-dlp playlist JSON")
            .map_err(Error::catalog)?;
        Ok(playlist.into_collection())
    }

    fn open(&self, representation: &Representation) -> Result<RemoteStream> {
        self.get(&representation.source)
    }

    fn open_thumbnail(&self, item: &MediaItem) -> Result<RemoteStream> {
        let url = item
            .thumbnail_url
            .as_deref()
            .ok_or_else(|| Error::Transfer("item has no thumbnail".to_owned()))?;
        self.get(url)
    }
}
