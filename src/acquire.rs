//! Stream a representation's bytes to local storage.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::catalog::{Catalog, RemoteStream};
use crate::media::Representation;
use crate::{Error, Result};

const CHUNK_BYTES: usize = 64 * 1024;

/// Fetch `representation` into `dest_dir` under a fresh `<prefix><uuid>.<container>` name.
///
/// Used for intermediates: the random part keeps concurrent runs from colliding in a shared
/// scratch directory.
pub fn fetch(
    catalog: &dyn Catalog,
    representation: &Representation,
    dest_dir: &Path,
    name_prefix: &str,
    on_progress: &mut dyn FnMut(u8),
) -> Result<PathBuf> {
    let dest_path = dest_dir.join(format!(
        "{name_prefix}{}.{}",
        Uuid::new_v4().simple(),
        representation.container
    ));
    fetch_to(catalog, representation, &dest_path, on_progress)?;
    Ok(dest_path)
}

/// Fetch `representation` into exactly `dest_path`, replacing whatever is there.
pub fn fetch_to(
    catalog: &dyn Catalog,
    representation: &Representation,
    dest_path: &Path,
    on_progress: &mut dyn FnMut(u8),
) -> Result<()> {
    tracing::debug!(
        id = %representation.id,
        dest = %dest_path.display(),
        "fetching representation"
    );
    let RemoteStream {
        reader,
        total_bytes,
    } = catalog.open(representation)?;
    write_stream(reader, total_bytes, dest_path, on_progress)
}

/// Copy `reader` into `dest_path` safely:
/// - write to `dest_path.part`, reporting progress after every chunk
/// - fsync + rename to the final path
///
/// Progress is `floor(done * 100 / total)`; it is skipped entirely when the total is unknown.
pub fn write_stream<R: Read>(
    mut reader: R,
    total_bytes: Option<u64>,
    dest_path: &Path,
    on_progress: &mut dyn FnMut(u8),
) -> Result<()> {
    let total = total_bytes.filter(|t| *t > 0);
    let tmp_path = PathBuf::from(format!("{}.part", dest_path.display()));

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp_path).map_err(|err| {
            Error::Transfer(format!(
                "failed to create temp file '{}': {err}",
                tmp_path.display()
            ))
        })?;

        let mut buf = vec![0u8; CHUNK_BYTES];
        let mut done: u64 = 0;
        loop {
            let n = reader.read(&mut buf).map_err(Error::transfer)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).map_err(Error::transfer)?;
            done += n as u64;

            if let Some(total) = total {
                on_progress(percent_of(done, total));
            }
        }

        file.sync_all().map_err(Error::transfer)?;

        fs::rename(&tmp_path, dest_path).map_err(|err| {
            Error::Transfer(format!(
                "failed to move into place '{}': {err}",
                dest_path.display()
            ))
        })?;

        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }

    result
}

fn percent_of(done: u64, total: u64) -> u8 {
    (u128::from(done) * 100 / u128::from(total)).min(100) as u8
}
