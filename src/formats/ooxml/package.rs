//! Package-level view of an OOXML file: part index, filters, source and destination
//!
//! The index is built once before the rewrite so that every filter and
//! transform sees the same verdicts no matter in which order the ZIP lists
//! the parts.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, trace};

use super::{
    content_types::{is_disallowed, ContentTypes, CONTENT_TYPES_PART},
    fail,
    relations::{parse_relationships, resolve_target, source_part},
};
use crate::{
    error::Result,
    filter::{
        Decision, DestinationContainer, Entry, EntryFilter, Placeholder, RewriteContext, SourceContainer,
    },
    formats::zip_container::{ZipDestination, ZipSource},
    threat::{Threat, ThreatAction, ThreatSeverity, ThreatType},
};

fn key(part: &str) -> String {
    part.trim_start_matches('/').to_ascii_lowercase()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// What the package holds and what will be removed from it
#[derive(Debug, Default)]
pub struct PackageIndex {
    content_types: ContentTypes,
    parts: BTreeSet<String>,
    removed: BTreeSet<String>,
    relationship_types: BTreeMap<String, String>,
    /// Relationship part -> Ids its source part's markup refers to
    references: BTreeMap<String, BTreeSet<String>>,
}

impl PackageIndex {
    pub fn build(source: &mut ZipSource<'_>, content_types: ContentTypes) -> Result<Self> {
        let mut index = Self {
            content_types,
            ..Default::default()
        };

        let entries = source.entries(None)?;
        for entry in entries.iter().filter(|e| !e.is_container() && e.path != CONTENT_TYPES_PART) {
            index.parts.insert(key(&entry.path));
            if let Some(content_type) = index.content_types.resolve(&entry.path) {
                if is_disallowed(content_type) {
                    trace!(part = %entry.path, content_type, "Part will be removed");
                    index.removed.insert(key(&entry.path));
                }
            }
        }

        for entry in entries.iter().filter(|e| !e.is_container()) {
            let owner = match source_part(&entry.path) {
                Some(owner) => owner,
                None => continue,
            };
            let relationships = parse_relationships(&source.read(entry)?).map_err(fail)?;

            for relationship in relationships.iter().filter(|r| !r.external) {
                index
                    .relationship_types
                    .insert(key(&resolve_target(&owner, &relationship.target)), relationship.kind.clone());
            }

            // Only markup can refer to a relationship Id
            let owner_is_markup = owner.to_ascii_lowercase().ends_with(".xml");
            if relationships.is_empty() || !owner_is_markup || !index.contains_part(&owner) {
                continue;
            }
            let markup = source.read_member(&owner_path(&entries, &owner))?;
            let referenced: BTreeSet<String> = relationships
                .iter()
                .filter(|r| contains(&markup, format!("\"{}\"", r.id).as_bytes()))
                .map(|r| r.id.clone())
                .collect();
            if !referenced.is_empty() {
                index.references.insert(key(&entry.path), referenced);
            }
        }

        debug!(
            parts = index.parts.len(),
            removed = index.removed.len(),
            "Package indexed"
        );
        Ok(index)
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    pub fn contains_part(&self, part: &str) -> bool {
        self.parts.contains(&key(part))
    }

    /// True when the part's content type keeps it out of the sanitized package
    pub fn is_removed(&self, part: &str) -> bool {
        self.removed.contains(&key(part))
    }

    pub fn relationship_type(&self, part: &str) -> Option<&str> {
        self.relationship_types.get(&key(part)).map(String::as_str)
    }

    pub fn references(&self, rels_part: &str) -> Option<&BTreeSet<String>> {
        self.references.get(&key(rels_part))
    }
}

/// ZIP member name for a part, keeping the member's own casing
fn owner_path(entries: &[Entry], part: &str) -> String {
    entries
        .iter()
        .find(|e| e.path.eq_ignore_ascii_case(part))
        .map_or_else(|| part.to_string(), |e| e.path.clone())
}

/// Rejects parts whose content type is deny-listed or not a document media type
#[derive(Debug, Default)]
pub struct ContentTypeFilter;

impl EntryFilter for ContentTypeFilter {
    fn name(&self) -> &str {
        "ContentTypeFilter"
    }

    fn evaluate(&self, entry: &Entry, ctx: &mut RewriteContext<'_, '_>) -> Decision {
        let content_type = match &entry.metadata.content_type {
            Some(content_type) if is_disallowed(content_type) => content_type,
            _ => return Decision::Keep,
        };

        debug!(
            "Found and removed suspicious content type: '{}' in '{}' (Size: {})",
            content_type, entry.path, entry.size
        );
        ctx.record_threat(
            Threat::builder()
                .kind(ThreatType::ActiveContent)
                .severity(ThreatSeverity::High)
                .action(ThreatAction::Remove)
                .location(format!("/{}", entry.path))
                .details(format!("Forbidden content type: {}", content_type))
                .build(),
        );
        Decision::Reject
    }
}

/// Rejects the relationship part of a removed part
#[derive(Debug)]
pub struct OrphanRelationshipsFilter {
    index: Arc<PackageIndex>,
}

impl OrphanRelationshipsFilter {
    pub fn new(index: Arc<PackageIndex>) -> Self {
        Self { index }
    }
}

impl EntryFilter for OrphanRelationshipsFilter {
    fn name(&self) -> &str {
        "OrphanRelationshipsFilter"
    }

    fn evaluate(&self, entry: &Entry, ctx: &mut RewriteContext<'_, '_>) -> Decision {
        let owner = match source_part(&entry.path) {
            Some(owner) if !owner.is_empty() && self.index.is_removed(&owner) => owner,
            _ => return Decision::Keep,
        };

        debug!(part = %entry.path, owner = %owner, "Dropping relationships of a removed part");
        ctx.record_threat(
            Threat::builder()
                .kind(ThreatType::UnrecognizedContent)
                .severity(ThreatSeverity::Low)
                .action(ThreatAction::Remove)
                .location(format!("/{}", entry.path))
                .details(format!("Relationships of removed part /{}", owner))
                .build(),
        );
        Decision::Reject
    }
}

/// Parts of the package, typed from the content type table
pub struct PackageSource<'a> {
    zip: ZipSource<'a>,
    index: Arc<PackageIndex>,
}

impl<'a> PackageSource<'a> {
    pub fn new(zip: ZipSource<'a>, index: Arc<PackageIndex>) -> Self {
        Self { zip, index }
    }
}

impl SourceContainer for PackageSource<'_> {
    fn entries(&mut self, parent: Option<&Entry>) -> Result<Vec<Entry>> {
        let index = &self.index;
        Ok(self
            .zip
            .entries(parent)?
            .into_iter()
            .filter(|entry| entry.path != CONTENT_TYPES_PART)
            .map(|mut entry| {
                entry.metadata.content_type = index.content_types().resolve(&entry.path).map(str::to_string);
                entry.metadata.relationship_type = index.relationship_type(&entry.path).map(str::to_string);
                entry
            })
            .collect())
    }

    fn read(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        self.zip.read(entry)
    }
}

/// Sanitized package under construction; remembers what it holds so the
/// content type table can be rebuilt to match
pub struct PackageDestination {
    zip: ZipDestination,
    written: BTreeSet<String>,
    placeholder_types: BTreeMap<String, String>,
}

impl PackageDestination {
    pub fn new(owner: &'static str) -> Self {
        Self {
            zip: ZipDestination::new(owner),
            written: BTreeSet::new(),
            placeholder_types: BTreeMap::new(),
        }
    }

    pub fn holds(&self, part: &str) -> bool {
        self.written.contains(&key(part))
    }

    /// Extension defaults needed by the placeholders that were written
    pub fn placeholder_types(&self) -> impl Iterator<Item = (&str, &str)> {
        self.placeholder_types.iter().map(|(e, t)| (e.as_str(), t.as_str()))
    }

    /// Writes the content type table and closes the archive
    pub fn finish(mut self, content_types: &ContentTypes) -> Result<Vec<u8>> {
        let xml = content_types.to_xml().map_err(fail)?;
        self.zip
            .add_file(CONTENT_TYPES_PART, &xml, zip::CompressionMethod::Deflated)?;
        self.zip.finish()
    }
}

impl DestinationContainer for PackageDestination {
    fn create_container(&mut self, entry: &Entry) -> Result<()> {
        self.zip.create_container(entry)
    }

    fn write_leaf(&mut self, entry: &Entry, payload: &[u8]) -> Result<()> {
        self.written.insert(key(&entry.path));
        self.zip.write_leaf(entry, payload)
    }

    fn write_placeholder(&mut self, placeholder: &Placeholder) -> Result<()> {
        if let (Some(content_type), Some((_, extension))) =
            (&placeholder.content_type, placeholder.path.rsplit_once('.'))
        {
            self.placeholder_types
                .insert(extension.to_ascii_lowercase(), content_type.clone());
        }
        self.written.insert(key(&placeholder.path));
        self.zip.write_placeholder(placeholder)
    }
}
