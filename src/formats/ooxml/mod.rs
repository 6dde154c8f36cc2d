//! Office Open XML packages (.docx/.xlsx/.pptx and their macro-enabled variants)
//!
//! A package is a ZIP of parts described by `[Content_Types].xml` and linked
//! by relationship parts. Parts with forbidden content types are dropped,
//! relationships and markup are cleaned by payload transforms, and the content
//! type table is rebuilt last to match what was actually written.

use std::{io::Write, sync::Arc};

use quick_xml::events::BytesStart;
use tracing::{debug, instrument};

use crate::{
    error::{FormatError, Result, SanitizeError},
    filter::{ContainerRewriter, FilterChain, RewriteContext},
    sanitizer::Sanitizer,
    session::SessionContext,
    threat::{Threat, ThreatAction, ThreatSeverity, ThreatType},
};

use super::zip_container::{is_zip, zip_contains, ZipSource};

pub mod content_types;
pub mod package;
pub mod relations;
pub mod tags;

pub use content_types::{ContentTypes, CONTENT_TYPES_PART};
pub use package::{ContentTypeFilter, OrphanRelationshipsFilter, PackageDestination, PackageIndex, PackageSource};
pub use relations::RelationshipsTransform;
pub use tags::XmlTagTransform;

const NAME: &str = "Office Bleach";

fn fail(err: impl Into<FormatError>) -> SanitizeError {
    SanitizeError::failed(NAME, err)
}

/// Unescaped value of the attribute whose local name is `name`
pub(crate) fn xml_attribute(element: &BytesStart<'_>, name: &[u8]) -> std::result::Result<Option<String>, FormatError> {
    for attribute in element.attributes() {
        let attribute = attribute?;
        if attribute.key.local_name().as_ref() == name {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// A ZIP is an OOXML package when it carries a content type table
pub fn is_ooxml(input: &[u8]) -> bool {
    is_zip(input) && zip_contains(input, CONTENT_TYPES_PART)
}

#[derive(Debug, Default)]
pub struct OoxmlSanitizer;

impl OoxmlSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for OoxmlSanitizer {
    fn detects(&self, input: &[u8]) -> bool {
        is_ooxml(input)
    }

    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(depth = ctx.depth(), size = input.len()))]
    fn sanitize(&self, input: &[u8], output: &mut dyn Write, ctx: &mut SessionContext<'_>) -> Result<()> {
        let mut zip = ZipSource::open(NAME, input, ctx.config().max_entry_size)?;
        let content_types = ContentTypes::parse(&zip.read_member(CONTENT_TYPES_PART)?).map_err(fail)?;
        let index = Arc::new(PackageIndex::build(&mut zip, content_types)?);

        let rewriter = ContainerRewriter::new(
            FilterChain::new()
                .with(ContentTypeFilter)
                .with(OrphanRelationshipsFilter::new(Arc::clone(&index))),
        )
        .with_transform(RelationshipsTransform::new(Arc::clone(&index)))
        .with_transform(XmlTagTransform);

        let mut source = PackageSource::new(zip, Arc::clone(&index));
        let mut rewrite_ctx = RewriteContext::new(ctx);
        let destination = rewriter.rewrite(&mut source, PackageDestination::new(NAME), &mut rewrite_ctx)?;

        let mut content_types = index.content_types().clone();
        content_types.retain_overrides(|part| destination.holds(part));
        for remap in content_types.remap() {
            debug!("Content type of '{}' changed from '{}' to '{}'", remap.location, remap.from, remap.to);
            rewrite_ctx.record_threat(
                Threat::builder()
                    .kind(ThreatType::UnrecognizedContent)
                    .severity(ThreatSeverity::Low)
                    .action(ThreatAction::Disarm)
                    .location(remap.location)
                    .details(format!("Remapped content type: {}", remap.from))
                    .build(),
            );
        }
        for (extension, content_type) in destination.placeholder_types() {
            content_types.ensure_default(extension, content_type);
        }

        output.write_all(&destination.finish(&content_types)?)?;
        Ok(())
    }
}
