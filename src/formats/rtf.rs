//! RTF documents
//!
//! Embedded objects are disarmed by turning every `\obj` control word into
//! the ignorable destination `\*\0bj`, which readers skip as unknown.

use std::io::Write;

use lazy_static::lazy_static;
use regex::bytes::Regex;
use tracing::{debug, instrument};

use crate::{
    error::Result,
    sanitizer::Sanitizer,
    session::SessionContext,
    threat::{Threat, ThreatAction, ThreatSeverity, ThreatType},
    utils::has_header,
};

pub const RTF_MAGIC: &[u8] = b"{\\rtf";

const NAME: &str = "RTF Bleach";

lazy_static! {
    static ref OBJECT_WORD: Regex = Regex::new(r"\\obj").unwrap();
    static ref DOUBLE_IGNORE: Regex = Regex::new(r"\\\*\\\*").unwrap();
}

/// Disarms one line; `None` when it holds no object
fn disarm_line(line: &[u8]) -> Option<Vec<u8>> {
    if !OBJECT_WORD.is_match(line) {
        return None;
    }
    let renamed = OBJECT_WORD.replace_all(line, &b"\\*\\0bj"[..]);
    Some(DOUBLE_IGNORE.replace_all(&renamed, &b"\\*"[..]).into_owned())
}

#[derive(Debug, Default)]
pub struct RtfSanitizer;

impl RtfSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for RtfSanitizer {
    fn detects(&self, input: &[u8]) -> bool {
        has_header(input, RTF_MAGIC)
    }

    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(depth = ctx.depth(), size = input.len()))]
    fn sanitize(&self, input: &[u8], output: &mut dyn Write, ctx: &mut SessionContext<'_>) -> Result<()> {
        let mut cleaned = Vec::with_capacity(input.len());

        for (number, line) in input.split_inclusive(|&b| b == b'\n').enumerate() {
            match disarm_line(line) {
                Some(disarmed) => {
                    debug!(line = number + 1, "OLE object found and disarmed");
                    ctx.record_threat(
                        Threat::builder()
                            .kind(ThreatType::BinaryContent)
                            .severity(ThreatSeverity::High)
                            .action(ThreatAction::Remove)
                            .location(format!("Line {}", number + 1))
                            .details("Embedded OLE Object")
                            .build(),
                    );
                    cleaned.extend_from_slice(&disarmed);
                }
                None => cleaned.extend_from_slice(line),
            }
        }

        output.write_all(&cleaned)?;
        Ok(())
    }
}
