//! ZIP source and destination shared by the archive and OOXML sanitizers

use std::io::{Cursor, Write};

use tracing::trace;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::{
    error::{FormatError, Result, SanitizeError},
    filter::{DestinationContainer, Entry, EntryMetadata, Placeholder, SourceContainer},
    utils::{has_header, read_bounded},
};

pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

const STORED: &str = "Stored";
const DEFLATED: &str = "Deflated";

pub fn is_zip(input: &[u8]) -> bool {
    has_header(input, &ZIP_MAGIC)
}

/// True when the archive's central directory lists `name`
pub fn zip_contains(input: &[u8], name: &str) -> bool {
    ZipArchive::new(Cursor::new(input))
        .map(|archive| archive.file_names().any(|n| n == name))
        .unwrap_or(false)
}

fn compression_name(method: CompressionMethod) -> Option<&'static str> {
    match method {
        CompressionMethod::Stored => Some(STORED),
        CompressionMethod::Deflated => Some(DEFLATED),
        _ => None,
    }
}

/// Flat view of an in-memory ZIP; directories are containers without children
pub struct ZipSource<'a> {
    owner: &'static str,
    archive: ZipArchive<Cursor<&'a [u8]>>,
    max_entry_size: u64,
}

impl<'a> ZipSource<'a> {
    /// `owner` names the sanitizer that failures are attributed to
    pub fn open(owner: &'static str, input: &'a [u8], max_entry_size: u64) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(input)).map_err(|e| SanitizeError::failed(owner, e))?;
        Ok(Self {
            owner,
            archive,
            max_entry_size,
        })
    }

    /// Reads a member by name, bounded by the configured entry size
    pub fn read_member(&mut self, name: &str) -> Result<Vec<u8>> {
        let owner = self.owner;
        let limit = self.max_entry_size;
        let file = self
            .archive
            .by_name(name)
            .map_err(|e| SanitizeError::failed(owner, e))?;
        read_bounded(file, limit).map_err(|e| SanitizeError::failed(owner, e))
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }
}

impl SourceContainer for ZipSource<'_> {
    fn entries(&mut self, parent: Option<&Entry>) -> Result<Vec<Entry>> {
        if parent.is_some() {
            return Ok(Vec::new());
        }

        let owner = self.owner;
        let mut entries = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            let file = self
                .archive
                .by_index_raw(index)
                .map_err(|e| SanitizeError::failed(owner, e))?;

            if file.is_dir() {
                entries.push(Entry::container(file.name()));
                continue;
            }

            let method = file.compression();
            let unreadable = if file.encrypted() {
                Some("encrypted".to_string())
            } else if compression_name(method).is_none() {
                Some(format!("unsupported compression method {:?}", method))
            } else {
                None
            };

            trace!(name = file.name(), size = file.size(), ?method, "Archive member");
            entries.push(Entry::leaf(file.name(), file.size()).with_metadata(EntryMetadata {
                compression: compression_name(method).map(str::to_string),
                unreadable,
                ..Default::default()
            }));
        }
        Ok(entries)
    }

    fn read(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        self.read_member(&entry.path)
    }
}

/// Builds a new ZIP in memory
pub struct ZipDestination {
    owner: &'static str,
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipDestination {
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    fn fail(&self, err: impl Into<FormatError>) -> SanitizeError {
        SanitizeError::failed(self.owner, err)
    }

    pub fn add_file(&mut self, name: &str, payload: &[u8], method: CompressionMethod) -> Result<()> {
        let options = SimpleFileOptions::default().compression_method(method);
        self.writer.start_file(name, options).map_err(|e| self.fail(e))?;
        self.writer.write_all(payload).map_err(|e| self.fail(e))?;
        Ok(())
    }

    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        self.writer
            .add_directory(name, SimpleFileOptions::default())
            .map_err(|e| self.fail(e))
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let owner = self.owner;
        let cursor = self.writer.finish().map_err(|e| SanitizeError::failed(owner, e))?;
        Ok(cursor.into_inner())
    }
}

/// Compression to use when copying `entry`; unknown methods are re-deflated
pub fn compression_for(entry: &Entry) -> CompressionMethod {
    match entry.metadata.compression.as_deref() {
        Some(STORED) => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    }
}

impl DestinationContainer for ZipDestination {
    fn create_container(&mut self, entry: &Entry) -> Result<()> {
        self.add_directory(&entry.path)
    }

    fn write_leaf(&mut self, entry: &Entry, payload: &[u8]) -> Result<()> {
        self.add_file(&entry.path, payload, compression_for(entry))
    }

    fn write_placeholder(&mut self, placeholder: &Placeholder) -> Result<()> {
        self.add_file(&placeholder.path, &placeholder.payload, CompressionMethod::Deflated)
    }
}

/// Builds an in-memory ZIP from `(name, payload)` pairs; names ending in `/` become directories
#[cfg(test)]
pub(crate) fn build_zip(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut destination = ZipDestination::new("test");
    for (name, payload) in members {
        if name.ends_with('/') {
            destination.add_directory(name).unwrap();
        } else {
            destination.add_file(name, payload, CompressionMethod::Deflated).unwrap();
        }
    }
    destination.finish().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_detection() {
        let data = build_zip(&[("[Content_Types].xml", b"<Types/>"), ("a.txt", b"a")]);
        assert!(is_zip(&data));
        assert!(zip_contains(&data, "[Content_Types].xml"));
        assert!(!zip_contains(&data, "b.txt"));
        assert!(!zip_contains(b"PK\x03\x04garbage", "a.txt"));
    }

    #[test]
    fn test_source_lists_members_flat() {
        let data = build_zip(&[("dir/", b""), ("dir/a.txt", b"hello")]);
        let mut source = ZipSource::open("test", &data, 1024).unwrap();
        let entries = source.entries(None).unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_container());
        assert_eq!(entries[1].path, "dir/a.txt");
        assert_eq!(entries[1].metadata.compression.as_deref(), Some("Deflated"));
        assert!(entries[1].metadata.unreadable.is_none());
        assert!(source.entries(Some(&entries[0])).unwrap().is_empty());
        assert_eq!(source.read(&entries[1]).unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_read_is_bounded() {
        let data = build_zip(&[("big.bin", &[0u8; 4096])]);
        let mut source = ZipSource::open("test", &data, 100).unwrap();
        let err = source.read_member("big.bin").unwrap_err();
        assert!(matches!(err, SanitizeError::SanitizerFailed { .. }));
    }
}
