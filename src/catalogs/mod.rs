/// Mapping from `yt-dlp -J` output onto the crate's data model.
pub mod ytdlp_info;

/// Catalog backed by the `yt-dlp` executable and plain HTTP downloads.
#[cfg(feature = "ytdlp")]
pub mod ytdlp;
