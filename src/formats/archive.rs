//! Generic ZIP archives
//!
//! Every member goes through the filters and, when another sanitizer claims
//! it, back through the session. Nested archives therefore count against the
//! session's recursion limit one level per archive.

use std::io::Write;

use tracing::{info, instrument};

use super::{
    ooxml::is_ooxml,
    zip_container::{is_zip, ZipDestination, ZipSource},
};
use crate::{
    error::Result,
    filter::{ContainerRewriter, Decision, Entry, EntryFilter, FilterChain, RewriteContext},
    sanitizer::Sanitizer,
    session::SessionContext,
    threat::{Threat, ThreatAction, ThreatSeverity, ThreatType},
};

const NAME: &str = "Archive Bleach";

/// Drops members that cannot be read back: encrypted or using an unsupported compression
#[derive(Debug, Default)]
pub struct UnreadableEntryFilter;

impl EntryFilter for UnreadableEntryFilter {
    fn name(&self) -> &str {
        "UnreadableEntryFilter"
    }

    fn evaluate(&self, entry: &Entry, ctx: &mut RewriteContext<'_, '_>) -> Decision {
        let reason = match &entry.metadata.unreadable {
            Some(reason) => reason,
            None => return Decision::Keep,
        };

        info!(entry = %entry, reason = %reason, "Dropping unreadable archive member");
        ctx.record_threat(
            Threat::builder()
                .kind(ThreatType::UnrecognizedContent)
                .severity(ThreatSeverity::Medium)
                .action(ThreatAction::Remove)
                .location(&entry.path)
                .details(format!("Unreadable archive member: {}", reason))
                .build(),
        );
        Decision::Reject
    }
}

/// Drops members whose declared size is above `max_entry_size`
#[derive(Debug, Default)]
pub struct OversizedEntryFilter;

impl EntryFilter for OversizedEntryFilter {
    fn name(&self) -> &str {
        "OversizedEntryFilter"
    }

    fn evaluate(&self, entry: &Entry, ctx: &mut RewriteContext<'_, '_>) -> Decision {
        let limit = ctx.session().config().max_entry_size;
        if entry.size <= limit {
            return Decision::Keep;
        }

        info!(entry = %entry, size = entry.size, limit, "Dropping oversized archive member");
        ctx.record_threat(
            Threat::builder()
                .kind(ThreatType::UnrecognizedContent)
                .severity(ThreatSeverity::Medium)
                .action(ThreatAction::Remove)
                .location(&entry.path)
                .details(format!("Member of {} bytes exceeds the {} byte limit", entry.size, limit))
                .build(),
        );
        Decision::Reject
    }
}

#[derive(Debug, Default)]
pub struct ArchiveSanitizer;

impl ArchiveSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for ArchiveSanitizer {
    fn detects(&self, input: &[u8]) -> bool {
        is_zip(input) && !is_ooxml(input)
    }

    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(depth = ctx.depth(), size = input.len()))]
    fn sanitize(&self, input: &[u8], output: &mut dyn Write, ctx: &mut SessionContext<'_>) -> Result<()> {
        let mut source = ZipSource::open(NAME, input, ctx.config().max_entry_size)?;
        let rewriter = ContainerRewriter::new(
            FilterChain::new()
                .with(UnreadableEntryFilter)
                .with(OversizedEntryFilter),
        );

        let destination = {
            let mut rewrite_ctx = RewriteContext::new(ctx);
            rewriter.rewrite(&mut source, ZipDestination::new(NAME), &mut rewrite_ctx)?
        };

        output.write_all(&destination.finish()?)?;
        Ok(())
    }
}
