//! IO helpers for header sniffing, bounded inflation and atomic output

use std::{
    fs,
    io::{self, Read, Write},
    path::Path,
};

use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::error::Result;

/// True when `input` starts with `magic`; never reads past the header.
pub fn has_header(input: &[u8], magic: &[u8]) -> bool {
    input.len() >= magic.len() && &input[..magic.len()] == magic
}

/// Reads at most `limit` bytes, failing instead of truncating when the
/// reader has more.
pub fn read_bounded<R: Read>(reader: R, limit: u64) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let read = reader.take(limit.saturating_add(1)).read_to_end(&mut buffer)?;
    if read as u64 > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("payload exceeds the {} byte limit", limit),
        ));
    }
    Ok(buffer)
}

/// Reads the entire contents of a file into a byte vector.
#[instrument]
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    Ok(fs::read(path)?)
}

/// Writes `data` next to `path` in a temporary file, then moves it into place.
///
/// With `overwrite` unset an existing file at `path` makes this fail with
/// `AlreadyExists` and leaves the existing file untouched.
#[instrument(skip(data), fields(size = data.len()))]
pub fn write_atomic(path: &Path, data: &[u8], overwrite: bool) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;

    if overwrite {
        temp.persist(path).map_err(|e| e.error)?;
    } else {
        temp.persist_noclobber(path).map_err(|e| e.error)?;
    }

    debug!(path = %path.display(), "Output written");
    Ok(())
}
