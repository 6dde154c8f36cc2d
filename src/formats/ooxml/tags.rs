//! Markup-level cleanup of XML parts
//!
//! Removing a relationship is not enough for some elements: Office refuses
//! to open a package whose markup still carries an `externalData` or
//! `oleObjects` element for a link that no longer exists. DDE fields are
//! disarmed here too.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::{
    error::Result,
    filter::{Entry, EntryKind, PayloadTransform, RewriteContext},
    threat::{Threat, ThreatAction, ThreatSeverity, ThreatType},
};

const BLEACHED: &str = "<!-- bleached -->";

lazy_static! {
    static ref EXTERNAL_DATA: Regex = Regex::new(
        r"(?s)<(?:\w+:)?externalData\b[^>]*?/>|<(?:\w+:)?externalData\b.*?</(?:\w+:)?externalData>"
    )
    .unwrap();
    static ref OLE_OBJECTS: Regex = Regex::new(r"(?s)<(?:\w+:)?oleObjects\b.*?</(?:\w+:)?oleObjects>").unwrap();
    static ref DDE_AUTO: Regex = Regex::new("DDEAUTO").unwrap();
    static ref DDE_SERVICE: Regex = Regex::new(r#"ddeService=".*?""#).unwrap();
    static ref DDE_TOPIC: Regex = Regex::new(r#"ddeTopic=".*?""#).unwrap();
}

/// Replaces every match; false when the text came out unchanged
fn apply(text: &mut String, pattern: &Regex, replacement: &str) -> bool {
    let replaced = pattern.replace_all(text.as_str(), replacement);
    if replaced.as_ref() == text.as_str() {
        return false;
    }
    let replaced = replaced.into_owned();
    *text = replaced;
    true
}

fn might_need_cleaning(text: &str) -> bool {
    ["externalData", "oleObjects", "DDEAUTO", "ddeService", "ddeTopic"]
        .iter()
        .any(|marker| text.contains(marker))
}

#[derive(Debug, Default)]
pub struct XmlTagTransform;

impl PayloadTransform for XmlTagTransform {
    fn applies(&self, entry: &Entry) -> bool {
        entry.kind == EntryKind::Leaf && entry.name.to_ascii_lowercase().ends_with(".xml")
    }

    fn transform(&self, entry: &Entry, payload: &[u8], ctx: &mut RewriteContext<'_, '_>) -> Result<Option<Vec<u8>>> {
        let mut text = match std::str::from_utf8(payload) {
            Ok(text) if might_need_cleaning(text) => text.to_string(),
            _ => return Ok(None),
        };
        let location = format!("/{}", entry.path);
        let mut changed = false;

        if apply(&mut text, &EXTERNAL_DATA, BLEACHED) {
            debug!("externalData tag has been spotted in {}", location);
            ctx.record_threat(
                Threat::builder()
                    .kind(ThreatType::ExternalContent)
                    .severity(ThreatSeverity::High)
                    .action(ThreatAction::Remove)
                    .location(&location)
                    .details("Removed tag \"externalData\" from the document.")
                    .build(),
            );
            changed = true;
        }

        // Every rewrite must run, so no short-circuit here
        let dde = apply(&mut text, &DDE_AUTO, "")
            | apply(&mut text, &DDE_SERVICE, r#"ddeService="cmd""#)
            | apply(&mut text, &DDE_TOPIC, r#"ddeTopic="exit""#);
        if dde {
            debug!("DDE has been spotted in {}", location);
            ctx.record_threat(
                Threat::builder()
                    .kind(ThreatType::ActiveContent)
                    .severity(ThreatSeverity::High)
                    .action(ThreatAction::Remove)
                    .location(&location)
                    .details("Removed tag \"DDEAUTO\" from the document.")
                    .build(),
            );
            changed = true;
        }

        if apply(&mut text, &OLE_OBJECTS, BLEACHED) {
            debug!("oleObjects have been spotted in {}", location);
            ctx.record_threat(
                Threat::builder()
                    .kind(ThreatType::BinaryContent)
                    .severity(ThreatSeverity::High)
                    .action(ThreatAction::Remove)
                    .location(&location)
                    .details("Removed oleObjects from the document.")
                    .build(),
            );
            changed = true;
        }

        Ok(changed.then(|| text.into_bytes()))
    }
}
