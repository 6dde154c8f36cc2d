//! Relationship parts (`_rels/*.rels`)
//!
//! Relationships are the package's links between parts and to the outside
//! world. Deny-listed types and external targets are dropped; a dropped link
//! whose Id is still used by the source part's markup is repointed at an
//! inert placeholder image so consumers never meet a dangling Id.

use std::{
    io::{Cursor, Write},
    sync::Arc,
};

use flate2::{write::ZlibEncoder, Compression, Crc};
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, Event},
    Reader, Writer,
};
use tracing::{debug, trace};

use super::{content_types::PNG, fail, package::PackageIndex, xml_attribute};
use crate::{
    error::{FormatError, Result},
    filter::{Entry, EntryKind, PayloadTransform, Placeholder, RewriteContext},
    threat::{Threat, ThreatAction, ThreatSeverity, ThreatType},
};

const NAMESPACE: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const EXTERNAL: &str = "External";
const OOXWORD_SCHEME: &str = "ooxWord";

pub const HYPERLINK: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
pub const IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

pub const VBA_PROJECT: &str = "http://schemas.microsoft.com/office/2006/relationships/vbaProject";
pub const VBA_PROJECT_SIGNATURE: &str = "http://schemas.microsoft.com/office/2006/relationships/vbaProjectSignature";
pub const WORD_VBA_DATA: &str = "http://schemas.microsoft.com/office/2006/relationships/wordVbaData";
pub const OPENXML_OLE_OBJECT: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/oleObject";
pub const OLE_OBJECT: &str = "http://schemas.microsoft.com/office/2006/relationships/oleObject";
pub const E1_OBJECT: &str = "http://schemas.microsoft.com/office/2006/relationships/e1Object";
pub const E2_OBJECT: &str = "http://schemas.microsoft.com/office/2006/relationships/e2Object";
pub const OPENXML_CONTROL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/control";
pub const OPENXML_ACTIVEX_CONTROL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/activeXControl";
pub const OPENXML_ACTIVEX_CONTROL_BIN: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/activeXControlBinary";
pub const ACTIVEX_CONTROL: &str = "http://schemas.microsoft.com/office/2006/relationships/activeXControl";
pub const ACTIVEX_CONTROL_BIN: &str = "http://schemas.microsoft.com/office/2006/relationships/activeXControlBinary";

const WHITELISTED: [&str; 1] = [HYPERLINK];

const BLACKLISTED: [&str; 12] = [
    VBA_PROJECT,
    VBA_PROJECT_SIGNATURE,
    WORD_VBA_DATA,
    OPENXML_OLE_OBJECT,
    OLE_OBJECT,
    E1_OBJECT,
    E2_OBJECT,
    OPENXML_CONTROL,
    OPENXML_ACTIVEX_CONTROL,
    OPENXML_ACTIVEX_CONTROL_BIN,
    ACTIVEX_CONTROL,
    ACTIVEX_CONTROL_BIN,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub kind: String,
    pub target: String,
    pub external: bool,
}

pub fn parse_relationships(xml: &[u8]) -> std::result::Result<Vec<Relationship>, FormatError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(element) | Event::Empty(element) if element.local_name().as_ref() == b"Relationship" => {
                let id = xml_attribute(&element, b"Id")?;
                let kind = xml_attribute(&element, b"Type")?;
                let target = xml_attribute(&element, b"Target")?;
                let mode = xml_attribute(&element, b"TargetMode")?;

                match (id, kind, target) {
                    (Some(id), Some(kind), Some(target)) => relationships.push(Relationship {
                        id,
                        kind,
                        target,
                        external: mode.is_some_and(|m| m.eq_ignore_ascii_case(EXTERNAL)),
                    }),
                    _ => return Err(FormatError::Corrupted("Relationship without Id, Type or Target".into())),
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

pub fn write_relationships(relationships: &[Relationship]) -> std::result::Result<Vec<u8>, FormatError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Start(
        BytesStart::new("Relationships").with_attributes([("xmlns", NAMESPACE)]),
    ))?;

    for relationship in relationships {
        let mut element = BytesStart::new("Relationship").with_attributes([
            ("Id", relationship.id.as_str()),
            ("Type", relationship.kind.as_str()),
            ("Target", relationship.target.as_str()),
        ]);
        if relationship.external {
            element.push_attribute(("TargetMode", EXTERNAL));
        }
        writer.write_event(Event::Empty(element))?;
    }

    writer.write_event(Event::End(BytesEnd::new("Relationships")))?;
    Ok(writer.into_inner().into_inner())
}

/// Part a relationship part belongs to: `word/_rels/document.xml.rels` gives
/// `word/document.xml`, the package-level `_rels/.rels` gives `""`.
pub fn source_part(rels_path: &str) -> Option<String> {
    let (dir, file) = match rels_path.rsplit_once('/') {
        Some(split) => split,
        None => return None,
    };
    let name = file.strip_suffix(".rels")?;
    let parent = if dir == "_rels" { "" } else { dir.strip_suffix("/_rels")? };

    Some(match parent {
        "" => name.to_string(),
        parent => format!("{}/{}", parent, name),
    })
}

/// Package path of `target` as seen from `source`
pub fn resolve_target(source: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or_default();
    let mut segments: Vec<&str> = match target.strip_prefix('/') {
        Some(_) => Vec::new(),
        None => source
            .rsplit_once('/')
            .map(|(dir, _)| dir.split('/').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default(),
    };

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    segments.join("/")
}

fn scheme(target: &str) -> Option<&str> {
    target.split_once(':').map(|(scheme, _)| scheme)
}

fn matches_any(list: &[&str], kind: &str) -> bool {
    list.iter().any(|t| t.eq_ignore_ascii_case(kind))
}

/// What happens to one relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    Blacklisted,
    External(ThreatSeverity),
    /// Points at a part that is being removed
    Dangling,
}

fn judge(relationship: &Relationship, source: &str, index: &PackageIndex) -> Verdict {
    if matches_any(&WHITELISTED, &relationship.kind) {
        return Verdict::Keep;
    }
    if matches_any(&BLACKLISTED, &relationship.kind) {
        return Verdict::Blacklisted;
    }
    if relationship.external {
        return match scheme(&relationship.target) {
            Some(OOXWORD_SCHEME) => Verdict::External(ThreatSeverity::Extreme),
            _ => Verdict::External(ThreatSeverity::High),
        };
    }
    if index.is_removed(&resolve_target(source, &relationship.target)) {
        return Verdict::Dangling;
    }
    Verdict::Keep
}

fn threat_for(verdict: Verdict, relationship: &Relationship, location: &str) -> Option<Threat> {
    let builder = Threat::builder().action(ThreatAction::Remove).location(location);
    match verdict {
        Verdict::Blacklisted => Some(
            builder
                .kind(ThreatType::ActiveContent)
                .severity(ThreatSeverity::High)
                .details(format!("Blacklisted relationship type: {}", relationship.kind))
                .build(),
        ),
        Verdict::External(severity) => Some(
            builder
                .kind(ThreatType::ExternalContent)
                .severity(severity)
                .details(format!("External relationship of type: {}", relationship.kind))
                .build(),
        ),
        Verdict::Keep | Verdict::Dangling => None,
    }
}

fn png_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);

    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

/// A 1x1 fully transparent RGBA image
pub fn placeholder_png() -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(13);
    header.extend_from_slice(&1u32.to_be_bytes());
    header.extend_from_slice(&1u32.to_be_bytes());
    header.extend_from_slice(&[8, 6, 0, 0, 0]);

    // Filter byte, then one RGBA pixel
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&[0, 0, 0, 0, 0])?;
    let pixels = encoder.finish()?;

    let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
    png_chunk(&mut png, b"IHDR", &header);
    png_chunk(&mut png, b"IDAT", &pixels);
    png_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

/// File-name-safe form of a relationship Id, numbered when the plain name is taken
fn placeholder_name(id: &str, attempt: usize) -> String {
    let safe: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    match attempt {
        0 => format!("bleached_{}.png", safe),
        n => format!("bleached_{}_{}.png", safe, n),
    }
}

/// Cleans every relationship part of the package
#[derive(Debug)]
pub struct RelationshipsTransform {
    index: Arc<PackageIndex>,
}

impl RelationshipsTransform {
    pub fn new(index: Arc<PackageIndex>) -> Self {
        Self { index }
    }

    fn placeholder(&self, source: &str, relationship: &Relationship) -> Result<(Relationship, Placeholder)> {
        let dir = source.rsplit_once('/').map(|(dir, _)| dir);
        // Never shadow a part the package already holds
        let mut attempt = 0;
        let (target, path) = loop {
            let target = format!("media/{}", placeholder_name(&relationship.id, attempt));
            let path = match dir {
                Some(dir) => format!("{}/{}", dir, target),
                None => target.clone(),
            };
            if !self.index.contains_part(&path) {
                break (target, path);
            }
            attempt += 1;
        };

        let replacement = Relationship {
            id: relationship.id.clone(),
            kind: IMAGE.to_string(),
            target,
            external: false,
        };
        let placeholder = Placeholder {
            path,
            id: relationship.id.clone(),
            content_type: Some(PNG.to_string()),
            payload: placeholder_png()?,
        };
        Ok((replacement, placeholder))
    }
}

impl PayloadTransform for RelationshipsTransform {
    fn applies(&self, entry: &Entry) -> bool {
        entry.kind == EntryKind::Leaf && source_part(&entry.path).is_some()
    }

    fn transform(&self, entry: &Entry, payload: &[u8], ctx: &mut RewriteContext<'_, '_>) -> Result<Option<Vec<u8>>> {
        let source = source_part(&entry.path).unwrap_or_default();
        let location = format!("/{}", source);
        let relationships = parse_relationships(payload).map_err(fail)?;
        let referenced = self.index.references(&entry.path);

        let mut kept = Vec::with_capacity(relationships.len());
        let mut changed = false;

        for relationship in relationships {
            trace!(
                id = %relationship.id,
                kind = %relationship.kind,
                target = %relationship.target,
                "Relationship from '{}'", location
            );

            let verdict = judge(&relationship, &source, &self.index);
            if verdict == Verdict::Keep {
                kept.push(relationship);
                continue;
            }

            debug!(id = %relationship.id, ?verdict, "Removing relationship from '{}'", location);
            changed = true;
            if let Some(threat) = threat_for(verdict, &relationship, &location) {
                ctx.record_threat(threat);
            }

            if !source.is_empty() && referenced.is_some_and(|ids| ids.contains(&relationship.id)) {
                let (replacement, placeholder) = self.placeholder(&source, &relationship)?;
                ctx.add_placeholder(placeholder);
                kept.push(replacement);
            }
        }

        if !changed {
            return Ok(None);
        }
        Ok(Some(write_relationships(&kept).map_err(fail)?))
    }
}
