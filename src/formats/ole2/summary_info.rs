//! `\x05SummaryInformation` property set cleanup
//!
//! The template (PID 7) and comments (PID 6) properties are blanked in
//! place: the string bytes are zeroed but every size and offset is kept, so
//! the property set stays valid and a second pass finds nothing to remove.

use std::ops::Range;

use tracing::{trace, warn};

use crate::{
    error::Result,
    filter::{Entry, EntryKind, PayloadTransform, RewriteContext},
    threat::{Threat, ThreatAction, ThreatSeverity, ThreatType},
};

pub const SUMMARY_INFORMATION: &str = "\u{5}SummaryInformation";

const NORMAL_TEMPLATE: &str = "Normal.dotm";
const PID_COMMENTS: u32 = 6;
const PID_TEMPLATE: u32 = 7;
const VT_LPSTR: u32 = 0x001E;
const VT_LPWSTR: u32 = 0x001F;
const BYTE_ORDER_MARK: u16 = 0xFFFE;
const HEADER_LEN: usize = 28;

/// A string property located inside the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringProperty {
    pub id: u32,
    pub value: String,
    pub range: Range<usize>,
}

fn u16_at(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn u32_at(data: &[u8], pos: usize) -> Option<u32> {
    let bytes = data.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn decode(bytes: &[u8], wide: bool) -> String {
    if wide {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        bytes[..end].iter().map(|&b| b as char).collect()
    }
}

/// Finds the string properties with the given ids in the first section.
///
/// Returns `None` when the stream is not a well-formed property set.
pub fn find_string_properties(data: &[u8], wanted: &[u32]) -> Option<Vec<StringProperty>> {
    if u16_at(data, 0)? != BYTE_ORDER_MARK || u32_at(data, 24)? == 0 {
        return None;
    }

    // First FMTID/offset pair follows the header
    let section = u32_at(data, HEADER_LEN + 16)? as usize;
    let count = u32_at(data, section.checked_add(4)?)? as usize;

    let mut found = Vec::new();
    for i in 0..count {
        let entry = section.checked_add(8)?.checked_add(i.checked_mul(8)?)?;
        let id = u32_at(data, entry)?;
        if !wanted.contains(&id) {
            continue;
        }

        let property = section.checked_add(u32_at(data, entry + 4)? as usize)?;
        let kind = u32_at(data, property)? & 0xFFFF;
        let length = u32_at(data, property + 4)? as usize;
        let (start, byte_len, wide) = match kind {
            VT_LPSTR => (property + 8, length, false),
            VT_LPWSTR => (property + 8, length.checked_mul(2)?, true),
            _ => continue,
        };

        let range = start..start.checked_add(byte_len)?;
        let bytes = data.get(range.clone())?;
        found.push(StringProperty {
            id,
            value: decode(bytes, wide),
            range,
        });
    }

    Some(found)
}

fn is_external_template(template: &str) -> bool {
    template.starts_with("http://") || template.starts_with("https://") || template.starts_with("ftp://")
}

/// Removes the attached template and the comments from summary information
#[derive(Debug, Default)]
pub struct SummaryInformationTransform;

impl PayloadTransform for SummaryInformationTransform {
    fn applies(&self, entry: &Entry) -> bool {
        entry.kind == EntryKind::Leaf && entry.name == SUMMARY_INFORMATION
    }

    fn transform(&self, entry: &Entry, payload: &[u8], ctx: &mut RewriteContext<'_, '_>) -> Result<Option<Vec<u8>>> {
        if payload.is_empty() {
            return Ok(None);
        }

        let properties = match find_string_properties(payload, &[PID_COMMENTS, PID_TEMPLATE]) {
            Some(properties) => properties,
            None => {
                warn!(entry = %entry, "Unreadable summary information, keeping it as is");
                return Ok(None);
            }
        };

        let mut cleaned = payload.to_vec();
        let mut changed = false;

        for property in properties {
            let threat = match property.id {
                PID_TEMPLATE if !property.value.is_empty() && property.value != NORMAL_TEMPLATE => {
                    trace!("Removing the document's template (was '{}')", property.value);
                    let severity = if is_external_template(&property.value) {
                        ThreatSeverity::High
                    } else {
                        ThreatSeverity::Low
                    };
                    Threat::builder()
                        .kind(ThreatType::ExternalContent)
                        .severity(severity)
                        .action(ThreatAction::Remove)
                        .location("Summary Information - Template")
                        .details(format!("Template was: '{}'", property.value))
                        .build()
                }
                PID_COMMENTS if !property.value.is_empty() => {
                    trace!("Removing the document's comments (was '{}')", property.value);
                    Threat::builder()
                        .kind(ThreatType::UnrecognizedContent)
                        .severity(ThreatSeverity::Low)
                        .action(ThreatAction::Remove)
                        .location("Summary Information - Comment")
                        .details(format!("Comment was: '{}'", property.value))
                        .build()
                }
                _ => continue,
            };

            cleaned[property.range].fill(0);
            ctx.record_threat(threat);
            changed = true;
        }

        Ok(changed.then_some(cleaned))
    }
}

/// Builds a minimal single-section property set holding `(id, value)` strings
#[cfg(test)]
pub(crate) fn build_property_set(properties: &[(u32, &str)]) -> Vec<u8> {
    let mut values = Vec::new();
    let mut offsets = Vec::new();
    let table_len = 8 + properties.len() * 8;
    for (_, value) in properties {
        offsets.push(table_len + values.len());
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        values.extend_from_slice(&VT_LPSTR.to_le_bytes());
        values.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        values.extend_from_slice(&bytes);
    }

    let mut section = Vec::new();
    section.extend_from_slice(&((table_len + values.len()) as u32).to_le_bytes());
    section.extend_from_slice(&(properties.len() as u32).to_le_bytes());
    for ((id, _), offset) in properties.iter().zip(&offsets) {
        section.extend_from_slice(&id.to_le_bytes());
        section.extend_from_slice(&(*offset as u32).to_le_bytes());
    }
    section.extend_from_slice(&values);

    let mut data = Vec::new();
    data.extend_from_slice(&BYTE_ORDER_MARK.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&0x0002_0A00u32.to_le_bytes());
    data.extend_from_slice(&[0u8; 16]);
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&[
        0xE0, 0x85, 0x9F, 0xF2, 0xF9, 0x4F, 0x68, 0x10, 0xAB, 0x91, 0x08, 0x00, 0x2B, 0x27, 0xB3, 0xD9,
    ]);
    data.extend_from_slice(&48u32.to_le_bytes());
    data.extend_from_slice(&section);
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::BleachConfig, session::SessionContext, threat::ThreatLedger};

    #[derive(Debug)]
    struct Inert;

    impl crate::sanitizer::Sanitizer for Inert {
        fn detects(&self, _input: &[u8]) -> bool {
            false
        }
        fn name(&self) -> &str {
            "Inert"
        }
        fn sanitize(
            &self,
            _input: &[u8],
            _output: &mut dyn std::io::Write,
            _ctx: &mut SessionContext<'_>,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn run(payload: &[u8]) -> (Option<Vec<u8>>, ThreatLedger) {
        let mut ledger = ThreatLedger::new();
        let config = BleachConfig::default();
        let result = {
            let mut session = SessionContext::new(&Inert, &mut ledger, &config);
            let mut ctx = RewriteContext::new(&mut session);
            let entry = Entry::leaf(format!("/{}", SUMMARY_INFORMATION), payload.len() as u64);
            SummaryInformationTransform.transform(&entry, payload, &mut ctx).unwrap()
        };
        (result, ledger)
    }

    #[test]
    fn test_finds_string_properties() {
        let data = build_property_set(&[(2, "Title"), (7, "evil.dotm")]);
        let found = find_string_properties(&data, &[7]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "evil.dotm");
    }

    #[test]
    fn test_external_template_and_comment_removed() {
        let data = build_property_set(&[(6, "call me"), (7, "https://evil.example/t.dotm")]);
        let (cleaned, ledger) = run(&data);
        let cleaned = cleaned.unwrap();

        assert_eq!(cleaned.len(), data.len());
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.as_slice()[0].kind(), ThreatType::UnrecognizedContent);
        assert_eq!(ledger.as_slice()[1].severity(), ThreatSeverity::High);
        assert_eq!(
            ledger.as_slice()[1].details(),
            "Template was: 'https://evil.example/t.dotm'"
        );

        let again = find_string_properties(&cleaned, &[6, 7]).unwrap();
        assert!(again.iter().all(|p| p.value.is_empty()));

        let (second, ledger) = run(&cleaned);
        assert!(second.is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_local_template_is_low_and_normal_is_kept() {
        let (cleaned, ledger) = run(&build_property_set(&[(7, "C:\\templates\\x.dotm")]));
        assert!(cleaned.is_some());
        assert_eq!(ledger.as_slice()[0].severity(), ThreatSeverity::Low);

        let (cleaned, ledger) = run(&build_property_set(&[(7, "Normal.dotm")]));
        assert!(cleaned.is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_garbage_is_left_alone() {
        let (cleaned, ledger) = run(b"not a property set at all");
        assert!(cleaned.is_none());
        assert!(ledger.is_empty());
    }
}
