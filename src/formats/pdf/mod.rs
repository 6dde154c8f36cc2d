//! PDF documents
//!
//! The document is loaded with lopdf, its object map is copied and cleaned
//! (actions, scripts, additional actions and embedded files) and the copy is
//! written out as a fresh file with a single cross-reference table.

use std::io::Write;

use lopdf::Document;
use tracing::{info, instrument, warn};

use crate::{
    error::{FormatError, Result, SanitizeError},
    sanitizer::Sanitizer,
    session::SessionContext,
    utils::has_header,
};

pub mod actions;
pub mod embedded;

pub const PDF_MAGIC: &[u8] = b"%PDF";

const NAME: &str = "PDF Bleach";

/// Trailer entries that describe the layout of the file that was read
const STALE_TRAILER_KEYS: [&[u8]; 2] = [b"Prev", b"XRefStm"];

fn fail(err: impl Into<FormatError>) -> SanitizeError {
    SanitizeError::failed(NAME, err)
}

#[derive(Debug, Default)]
pub struct PdfSanitizer;

impl PdfSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for PdfSanitizer {
    fn detects(&self, input: &[u8]) -> bool {
        has_header(input, PDF_MAGIC)
    }

    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(depth = ctx.depth(), size = input.len()))]
    fn sanitize(&self, input: &[u8], output: &mut dyn Write, ctx: &mut SessionContext<'_>) -> Result<()> {
        let mut document = Document::load_mem(input).map_err(fail)?;
        if document.trailer.has(b"Encrypt") {
            warn!("PDF is protected with an unknown password");
            return Err(fail(FormatError::Encrypted(
                "document is protected with an unknown password".into(),
            )));
        }

        let before = ctx.threat_count();
        let mut objects = document.objects.clone();
        actions::clean_document_actions(&document, &mut objects, ctx);
        actions::crawl(&mut objects, ctx);
        embedded::sanitize_embedded_files(&mut objects, ctx)?;

        document.objects = objects;
        for key in STALE_TRAILER_KEYS {
            document.trailer.remove(key);
        }

        let mut rebuilt = Vec::with_capacity(input.len());
        document.save_to(&mut rebuilt).map_err(fail)?;
        info!(
            objects = document.objects.len(),
            threats = ctx.threat_count() - before,
            "PDF rebuilt"
        );
        output.write_all(&rebuilt)?;
        Ok(())
    }
}
