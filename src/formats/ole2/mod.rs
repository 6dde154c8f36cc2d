//! OLE2 compound files (.doc, .xls, .ppt, .msi)
//!
//! The source file is copied storage by storage into a fresh compound file.
//! Entries rejected by the filters are simply never copied; class IDs are
//! carried over for every storage, the root included.

use std::io::{Cursor, Read, Write};

use cfb::CompoundFile;
use tracing::{debug, instrument};

use crate::{
    error::{FormatError, Result, SanitizeError},
    filter::{
        ContainerRewriter, DestinationContainer, Entry, EntryMetadata, FilterChain, Placeholder,
        RewriteContext, SourceContainer,
    },
    sanitizer::Sanitizer,
    session::SessionContext,
    utils::has_header,
};

pub mod filters;
pub mod summary_info;

pub use filters::{MacroFilter, ObjectFilter};
pub use summary_info::SummaryInformationTransform;

pub const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const NAME: &str = "OLE2 Bleach";
const ROOT: &str = "/";

fn fail(err: impl Into<FormatError>) -> SanitizeError {
    SanitizeError::failed(NAME, err)
}

#[derive(Debug, Default)]
pub struct Ole2Sanitizer;

impl Ole2Sanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for Ole2Sanitizer {
    fn detects(&self, input: &[u8]) -> bool {
        has_header(input, &OLE2_MAGIC)
    }

    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(depth = ctx.depth(), size = input.len()))]
    fn sanitize(&self, input: &[u8], output: &mut dyn Write, ctx: &mut SessionContext<'_>) -> Result<()> {
        let mut source = Ole2Source::open(input)?;
        let mut destination = Ole2Destination::create()?;

        let root_clsid = *source.file.root_entry().clsid();
        debug!(clsid = %root_clsid, "Root class ID");
        destination.file.set_storage_clsid(ROOT, root_clsid).map_err(fail)?;

        let rewriter = ContainerRewriter::new(FilterChain::new().with(MacroFilter).with(ObjectFilter))
            .with_transform(SummaryInformationTransform);

        let destination = {
            let mut rewrite_ctx = RewriteContext::new(ctx);
            rewriter.rewrite(&mut source, destination, &mut rewrite_ctx)?
        };

        output.write_all(&destination.finish()?)?;
        Ok(())
    }
}

/// Read side over an in-memory compound file
pub struct Ole2Source<'a> {
    file: CompoundFile<Cursor<&'a [u8]>>,
}

impl<'a> Ole2Source<'a> {
    pub fn open(input: &'a [u8]) -> Result<Self> {
        let file = CompoundFile::open(Cursor::new(input)).map_err(fail)?;
        Ok(Self { file })
    }

    fn children(&self, path: &str) -> Result<Vec<cfb::Entry>> {
        Ok(self.file.read_storage(path).map_err(fail)?.collect())
    }
}

impl SourceContainer for Ole2Source<'_> {
    fn entries(&mut self, parent: Option<&Entry>) -> Result<Vec<Entry>> {
        let parent_path = parent.map_or(ROOT, |p| p.path.as_str());

        let mut entries = Vec::new();
        for child in self.children(parent_path)? {
            let path = child.path().to_string_lossy().into_owned();
            let entry = if child.is_storage() {
                let children = self.children(&path)?.iter().map(|c| c.name().to_string()).collect();
                Entry::container(path).with_metadata(EntryMetadata {
                    class_id: Some(*child.clsid()),
                    children,
                    ..Default::default()
                })
            } else {
                Entry::leaf(path, child.len())
            };
            entries.push(entry);
        }
        Ok(entries)
    }

    fn read(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        let mut stream = self.file.open_stream(&entry.path).map_err(fail)?;
        let mut payload = Vec::with_capacity(entry.size as usize);
        stream.read_to_end(&mut payload).map_err(fail)?;
        Ok(payload)
    }
}

/// Write side building a new compound file in memory
pub struct Ole2Destination {
    file: CompoundFile<Cursor<Vec<u8>>>,
}

impl Ole2Destination {
    pub fn create() -> Result<Self> {
        let file = CompoundFile::create(Cursor::new(Vec::new())).map_err(fail)?;
        Ok(Self { file })
    }

    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.file.flush().map_err(fail)?;
        Ok(self.file.into_inner().into_inner())
    }

    fn write_stream(&mut self, path: &str, payload: &[u8]) -> Result<()> {
        let mut stream = self.file.create_stream(path).map_err(fail)?;
        stream.write_all(payload).map_err(fail)?;
        stream.flush().map_err(fail)?;
        Ok(())
    }
}

impl DestinationContainer for Ole2Destination {
    fn create_container(&mut self, entry: &Entry) -> Result<()> {
        self.file.create_storage(&entry.path).map_err(fail)?;
        if let Some(clsid) = entry.metadata.class_id {
            self.file.set_storage_clsid(&entry.path, clsid).map_err(fail)?;
        }
        Ok(())
    }

    fn write_leaf(&mut self, entry: &Entry, payload: &[u8]) -> Result<()> {
        self.write_stream(&entry.path, payload)
    }

    fn write_placeholder(&mut self, placeholder: &Placeholder) -> Result<()> {
        self.write_stream(&placeholder.path, &placeholder.payload)
    }
}
