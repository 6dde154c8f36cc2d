//! Bleach session: one top-level sanitize request
//!
//! A `BleachSession` owns the threat ledger and the configured recursion
//! bound. While a request runs, format sanitizers see it through a
//! `SessionContext`, which carries the current nesting depth by value: a
//! nested call builds a child context one level deeper, so sibling calls
//! always observe the depth of their parent no matter how a child exits.

use std::{
    io::{Read, Write},
    sync::Arc,
};

use tracing::{debug, info, instrument, warn};

use crate::{
    config::{BleachConfig, UnrecognizedPolicy},
    error::{Result, SanitizeError},
    sanitizer::Sanitizer,
    threat::{Threat, ThreatAction, ThreatLedger, ThreatSeverity, ThreatType},
};

/// One sanitize request and the threats it found
#[derive(Debug)]
pub struct BleachSession {
    sanitizer: Arc<dyn Sanitizer>,
    config: BleachConfig,
    ledger: ThreatLedger,
}

impl BleachSession {
    pub fn new(sanitizer: Arc<dyn Sanitizer>) -> Self {
        Self::with_config(sanitizer, BleachConfig::default())
    }

    pub fn with_config(sanitizer: Arc<dyn Sanitizer>, config: BleachConfig) -> Self {
        Self {
            sanitizer,
            config,
            ledger: ThreatLedger::new(),
        }
    }

    /// Reads `input` to the end, sanitizes it and writes the result to `output`.
    ///
    /// Nothing is written to `output` unless the whole document was sanitized.
    #[instrument(skip_all, fields(sanitizer = self.sanitizer.name()))]
    pub fn sanitize<R: Read, W: Write>(&mut self, mut input: R, mut output: W) -> Result<()> {
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer)?;

        let clean = self.sanitize_bytes(&buffer)?;
        output.write_all(&clean)?;
        output.flush()?;
        Ok(())
    }

    /// Sanitizes an in-memory document and returns the clean bytes
    pub fn sanitize_bytes(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let sanitizer = Arc::clone(&self.sanitizer);

        if !sanitizer.detects(input) {
            if self.config.unrecognized == UnrecognizedPolicy::Reject {
                warn!("No sanitizer claims this input");
                return Err(SanitizeError::NoApplicableSanitizer);
            }
            debug!("Input not recognized, passing it through unchanged");
            return Ok(input.to_vec());
        }

        let before = self.ledger.len();
        let mut context = SessionContext::new(sanitizer.as_ref(), &mut self.ledger, &self.config);
        let clean = context.sanitize(input)?;

        info!(
            threats = self.ledger.len() - before,
            input_size = input.len(),
            output_size = clean.len(),
            "Sanitization complete"
        );
        Ok(clean)
    }

    pub fn threats(&self) -> &[Threat] {
        self.ledger.as_slice()
    }

    pub fn threat_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn ledger(&self) -> &ThreatLedger {
        &self.ledger
    }

    pub fn config(&self) -> &BleachConfig {
        &self.config
    }

    pub fn sanitizer_name(&self) -> &str {
        self.sanitizer.name()
    }
}

/// The session as seen by a format sanitizer during one call
pub struct SessionContext<'s> {
    root: &'s dyn Sanitizer,
    ledger: &'s mut ThreatLedger,
    config: &'s BleachConfig,
    depth: usize,
}

impl<'s> SessionContext<'s> {
    /// Top-level context; the first `sanitize` call runs at depth 1
    pub fn new(root: &'s dyn Sanitizer, ledger: &'s mut ThreatLedger, config: &'s BleachConfig) -> Self {
        Self {
            root,
            ledger,
            config,
            depth: 0,
        }
    }

    pub fn record_threat(&mut self, threat: Threat) {
        self.ledger.record(threat);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn config(&self) -> &BleachConfig {
        self.config
    }

    pub fn threat_count(&self) -> usize {
        self.ledger.len()
    }

    /// True when the root sanitizer would claim `payload` as a document of its own
    pub fn is_document(&self, payload: &[u8]) -> bool {
        self.root.detects(payload)
    }

    /// Runs the root sanitizer over `input` one nesting level deeper.
    ///
    /// Fails with `RecursionLimitExceeded` before doing any work once the
    /// configured depth would be exceeded.
    pub fn sanitize(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let depth = self.depth + 1;
        if depth > self.config.max_depth {
            warn!(depth, max_depth = self.config.max_depth, "Recursion limit reached");
            return Err(SanitizeError::RecursionLimitExceeded(depth));
        }

        let root = self.root;
        let mut child = SessionContext {
            root,
            ledger: &mut *self.ledger,
            config: self.config,
            depth,
        };

        let mut output = Vec::with_capacity(input.len());
        root.sanitize(input, &mut output, &mut child)?;
        Ok(output)
    }

    /// Sanitizes an embedded sub-document found at `location`.
    ///
    /// A nested failure keeps the original bytes and is recorded as an ignored
    /// threat, except a recursion limit breach, which always propagates.
    pub fn sanitize_embedded(&mut self, location: &str, payload: &[u8]) -> Result<Vec<u8>> {
        match self.sanitize(payload) {
            Ok(clean) => Ok(clean),
            Err(err) if err.is_recursion_limit() => Err(err),
            Err(err) => {
                warn!(location, error = %err, "Embedded document could not be sanitized, keeping it as is");
                self.record_threat(
                    Threat::builder()
                        .kind(ThreatType::UnrecognizedContent)
                        .severity(ThreatSeverity::Medium)
                        .action(ThreatAction::Ignore)
                        .location(location)
                        .details(format!("Embedded document could not be sanitized: {}", err))
                        .build(),
                );
                Ok(payload.to_vec())
            }
        }
    }
}
