//! Ordered registry of installed format sanitizers

use std::sync::Arc;

use tracing::debug;

use super::{CompositeSanitizer, Sanitizer};
use crate::{
    config::{BleachConfig, FormatKind},
    error::Result,
    formats::{
        archive::ArchiveSanitizer, ole2::Ole2Sanitizer, ooxml::OoxmlSanitizer, pdf::PdfSanitizer,
        rtf::RtfSanitizer,
    },
};

/// Builds the root sanitizer from the enabled formats.
///
/// Once built the registry is read-only and can back any number of sessions.
#[derive(Debug, Default)]
pub struct SanitizerRegistry {
    sanitizers: Vec<Arc<dyn Sanitizer>>,
}

impl SanitizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in format in default order
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in FormatKind::ALL {
            registry.register(builtin(kind));
        }
        registry
    }

    /// The formats enabled in `config`, in the configured order
    pub fn from_config(config: &BleachConfig) -> Result<Self> {
        config.validate()?;
        let mut registry = Self::new();
        for kind in &config.formats {
            registry.register(builtin(*kind));
        }
        Ok(registry)
    }

    pub fn register(&mut self, sanitizer: Arc<dyn Sanitizer>) -> &mut Self {
        debug!(sanitizer = sanitizer.name(), "Registered sanitizer");
        self.sanitizers.push(sanitizer);
        self
    }

    pub fn sanitizers(&self) -> &[Arc<dyn Sanitizer>] {
        &self.sanitizers
    }

    pub fn len(&self) -> usize {
        self.sanitizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sanitizers.is_empty()
    }

    /// The root sanitizer for a session
    pub fn build(&self) -> Arc<dyn Sanitizer> {
        Arc::new(CompositeSanitizer::new(self.sanitizers.clone()))
    }
}

fn builtin(kind: FormatKind) -> Arc<dyn Sanitizer> {
    match kind {
        FormatKind::Ole2 => Arc::new(Ole2Sanitizer::new()),
        FormatKind::Ooxml => Arc::new(OoxmlSanitizer::new()),
        FormatKind::Pdf => Arc::new(PdfSanitizer::new()),
        FormatKind::Rtf => Arc::new(RtfSanitizer::new()),
        FormatKind::Archive => Arc::new(ArchiveSanitizer::new()),
    }
}
