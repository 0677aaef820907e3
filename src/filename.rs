//! Filesystem-safe, collision-free output naming.

use std::fs::OpenOptions;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::Result;

/// Characters we never let into a file name.
const ILLEGAL: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Longest stem (in bytes) we keep before truncating and adding a hash suffix.
pub const MAX_STEM_BYTES: usize = 150;

/// Remove characters that are illegal in file names and trim surrounding whitespace.
///
/// No replacement character is inserted, so `"a: b"` becomes `"a b"`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| !ILLEGAL.contains(c))
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Sanitize `title` into a stem that fits comfortably inside path limits.
///
/// Long titles are cut at a char boundary and suffixed with `~` plus 8 hex chars of the SHA-256
/// of the full sanitized title, so two long titles sharing a prefix still map to distinct stems.
pub fn bounded_stem(title: &str) -> String {
    let clean = sanitize(title);
    if clean.is_empty() {
        return "untitled".to_owned();
    }
    if clean.len() <= MAX_STEM_BYTES {
        return clean;
    }

    let mut cut = MAX_STEM_BYTES;
    while !clean.is_char_boundary(cut) {
        cut -= 1;
    }

    let digest = hex::encode(Sha256::digest(clean.as_bytes()));
    format!("{}~{}", clean[..cut].trim_end(), &digest[..8])
}

/// Return `path` if it is free, otherwise the first free `<stem>_N<.ext>` for N = 1, 2, …
///
/// This only checks existence; another process can take the name between the check and the
/// caller's write. Use [`claim_unique`] when the caller is about to create the file.
pub fn uniquify(path: &Path) -> PathBuf {
    candidates(path)
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Like [`uniquify`], but atomically creates an empty placeholder at the chosen path.
///
/// Each candidate is opened with create-if-absent, so two concurrent callers racing for the same
/// base name always end up with different paths. The caller owns the placeholder: overwrite it
/// with the real output or remove it on failure.
pub fn claim_unique(path: &Path) -> Result<PathBuf> {
    for candidate in candidates(path) {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => return Ok(candidate),
            Err(err) if err.kind() == IoErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }
    unreachable!("candidate sequence is unbounded")
}

/// `path`, then `<stem>_1<.ext>`, `<stem>_2<.ext>`, …
fn candidates(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    std::iter::once(path.to_path_buf())
        .chain((1u64..).map(move |n| parent.join(format!("{stem}_{n}{ext}"))))
}
