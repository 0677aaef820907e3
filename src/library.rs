//! The persisted outputs in an output directory: list, locate, delete.
//!
//! Every entry point takes a bare file name coming from a front end and refuses anything that
//! could step outside the output directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::{Error, Result};

const THUMBNAIL_EXTENSION: &str = "jpg";
const PARTIAL_EXTENSION: &str = "part";

/// One finished file in the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputFile {
    pub filename: String,
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub modified: u64,
    /// Name of the same-stem `.jpg` next to it, if there is one.
    pub thumbnail: Option<String>,
}

/// Reject names that are empty, `.`/`..`, or contain a path separator or NUL.
///
/// Dots elsewhere are fine: titles like `Wait... what` sanitize to names that keep them.
pub fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(Error::InvalidInput(format!("invalid file name '{name}'")));
    }
    Ok(())
}

/// List finished files, newest first.
///
/// Thumbnails and in-flight `.part` files are not listed on their own; a thumbnail shows up as
/// the `thumbnail` of the file sharing its stem.
pub fn list_outputs(dir: &Path) -> Result<Vec<OutputFile>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        // Nothing has been downloaded yet.
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }

        let path = entry.path();
        if has_extension(&path, THUMBNAIL_EXTENSION) || has_extension(&path, PARTIAL_EXTENSION) {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            continue;
        };

        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let thumb = thumbnail_path(&path);
        let thumbnail = thumb
            .is_file()
            .then(|| thumb.file_name().map(|n| n.to_string_lossy().into_owned()))
            .flatten();

        files.push(OutputFile {
            filename,
            size: meta.len(),
            modified,
            thumbnail,
        });
    }

    files.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    Ok(files)
}

/// Path of an existing file called `name` in `dir`.
pub fn locate(dir: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    let path = dir.join(name);
    if !path.is_file() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("file not found: {name}"),
        )));
    }
    Ok(path)
}

/// Delete `name` and its same-stem thumbnail, if any.
///
/// A thumbnail is shared by every output with the same stem (`Song.mp3` and `Song.webm` both
/// show `Song.jpg`); it is only removed together with the last of them.
pub fn delete(dir: &Path, name: &str) -> Result<()> {
    let path = locate(dir, name)?;
    fs::remove_file(&path)?;

    let thumb = thumbnail_path(&path);
    if thumb != path
        && !has_stem_sibling(dir, &path).unwrap_or(true)
        && let Err(err) = fs::remove_file(&thumb)
        && err.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %thumb.display(), error = %err, "failed to remove thumbnail");
    }

    tracing::info!(file = name, "deleted output");
    Ok(())
}

/// `true` when `err` means "no such file", so front ends can answer 404.
pub fn is_not_found(err: &Error) -> bool {
    matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::NotFound)
}

/// Another media file (not a thumbnail or `.part`) shares `path`'s stem.
fn has_stem_sibling(dir: &Path, path: &Path) -> Result<bool> {
    let Some(stem) = path.file_stem() else {
        return Ok(false);
    };
    for entry in fs::read_dir(dir)? {
        let other = entry?.path();
        if other != path
            && other.is_file()
            && other.file_stem() == Some(stem)
            && !has_extension(&other, THUMBNAIL_EXTENSION)
            && !has_extension(&other, PARTIAL_EXTENSION)
        {
            return Ok(true);
        }
    }
    Ok(false)
}

fn thumbnail_path(path: &Path) -> PathBuf {
    path.with_extension(THUMBNAIL_EXTENSION)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
