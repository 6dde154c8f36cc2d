//! Entry-filter chain applied while copying a container document
//!
//! Compound formats (OLE2 storages, OOXML packages, ZIP archives) are all
//! rebuilt the same way: walk the source tree, ask the filter chain about
//! every entry, and copy only what every filter keeps. See `rewrite` for the
//! copy itself.

use std::fmt;

use tracing::debug;
use uuid::Uuid;

pub mod rewrite;

pub use rewrite::{
    ContainerRewriter, DestinationContainer, PayloadTransform, Placeholder, RewriteContext,
    SourceContainer,
};

/// Whether an entry is a directory-like node or a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Container,
    Leaf,
}

/// Format-specific typing information carried by an entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    /// OLE2 storage class ID
    pub class_id: Option<Uuid>,
    /// OOXML part content type
    pub content_type: Option<String>,
    /// Relationship type through which the entry was reached
    pub relationship_type: Option<String>,
    /// Names of the direct children of a container
    pub children: Vec<String>,
    /// Compression method name for archive members
    pub compression: Option<String>,
    /// Why the payload cannot be read, when it cannot
    pub unreadable: Option<String>,
}

/// One structural unit of a container document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Full path inside the container, `/` separated
    pub path: String,
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub metadata: EntryMetadata,
}

impl Entry {
    pub fn leaf(path: impl Into<String>, size: u64) -> Self {
        Self::with_kind(path.into(), EntryKind::Leaf, size)
    }

    pub fn container(path: impl Into<String>) -> Self {
        Self::with_kind(path.into(), EntryKind::Container, 0)
    }

    fn with_kind(path: String, kind: EntryKind, size: u64) -> Self {
        let name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            path,
            name,
            kind,
            size,
            metadata: EntryMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_container(&self) -> bool {
        self.kind == EntryKind::Container
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Filter verdict for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Keep,
    Reject,
}

/// A single keep/reject policy.
///
/// A filter that rejects must record exactly one threat describing why.
/// Evaluating an entry that the filter already kept must keep it again
/// without recording anything.
pub trait EntryFilter: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, entry: &Entry, ctx: &mut RewriteContext<'_, '_>) -> Decision;
}

/// Ordered filters combined by AND, stopping at the first rejection
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn EntryFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl EntryFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn EntryFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn evaluate(&self, entry: &Entry, ctx: &mut RewriteContext<'_, '_>) -> Decision {
        for filter in &self.filters {
            if filter.evaluate(entry, ctx) == Decision::Reject {
                debug!(entry = %entry, filter = filter.name(), "Entry rejected");
                return Decision::Reject;
            }
        }
        Decision::Keep
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.filters.iter().map(|filter| filter.name()).collect();
        f.debug_struct("FilterChain").field("filters", &names).finish()
    }
}
