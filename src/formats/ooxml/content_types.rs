//! `[Content_Types].xml`: the package's table of part media types
//!
//! Parts resolve through an `Override` keyed by part name first and an
//! extension `Default` second. Part names compare case-insensitively.

use std::io::Cursor;

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, Event},
    Reader, Writer,
};

use super::xml_attribute;
use crate::error::FormatError;

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const NAMESPACE: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

// Main document parts
pub const MAIN_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
pub const MAIN_DOCM: &str = "application/vnd.ms-word.document.macroEnabled.main+xml";
pub const MAIN_DOTX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.template.main+xml";
pub const MAIN_DOTM: &str = "application/vnd.ms-word.template.macroEnabledTemplate.main+xml";
pub const MAIN_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
pub const MAIN_XLSM: &str = "application/vnd.ms-excel.sheet.macroEnabled.main+xml";
pub const MAIN_XLTX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.template.main+xml";
pub const MAIN_XLTM: &str = "application/vnd.ms-excel.template.macroEnabled.main+xml";
pub const MAIN_PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
pub const MAIN_PPTM: &str = "application/vnd.ms-powerpoint.presentation.macroEnabled.main+xml";
pub const MAIN_POTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.template.main+xml";
pub const MAIN_POTM: &str = "application/vnd.ms-powerpoint.template.macroEnabled.main+xml";
pub const MAIN_PPSX: &str = "application/vnd.openxmlformats-officedocument.presentationml.slideshow.main+xml";
pub const MAIN_PPSM: &str = "application/vnd.ms-powerpoint.slideshow.macroEnabled.main+xml";

// Macros
pub const VBA_DATA: &str = "application/vnd.ms-word.vbaData+xml";
pub const VBA_PROJECT: &str = "application/vnd.ms-office.vbaProject";
pub const VBA_PROJECT_SIGNATURE: &str = "application/vnd.ms-office.vbaProjectSignature";

pub const POSTSCRIPT: &str = "application/postscript";

// Embedded objects and controls
pub const OLE_OBJECT: &str = "application/vnd.openxmlformats-officedocument.oleObject";
pub const PACKAGE: &str = "application/vnd.openxmlformats-officedocument.package";
pub const ACTIVEX: &str = "application/vnd.ms-office.activeX";
pub const OPENXML_ACTIVEX: &str = "application/vnd.openxmlformats-officedocument.activeX";
pub const OPENXML_ACTIVEX_XML: &str = "application/vnd.openxmlformats-officedocument.activeX+xml";

pub const PNG: &str = "image/png";

const FORBIDDEN: [&str; 9] = [
    VBA_DATA,
    VBA_PROJECT,
    VBA_PROJECT_SIGNATURE,
    POSTSCRIPT,
    OLE_OBJECT,
    PACKAGE,
    ACTIVEX,
    OPENXML_ACTIVEX,
    OPENXML_ACTIVEX_XML,
];

/// Macro-enabled main parts and their macro-free equivalents
const REMAPPED: [(&str, &str); 7] = [
    (MAIN_DOCM, MAIN_DOCX),
    (MAIN_DOTM, MAIN_DOTX),
    (MAIN_XLTM, MAIN_XLTX),
    (MAIN_XLSM, MAIN_XLSX),
    (MAIN_PPSM, MAIN_PPSX),
    (MAIN_PPTM, MAIN_PPTX),
    (MAIN_POTM, MAIN_POTX),
];

/// Media type without its parameters
fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

pub fn is_forbidden(content_type: &str) -> bool {
    let essence = essence(content_type);
    FORBIDDEN.iter().any(|t| t.eq_ignore_ascii_case(essence))
}

/// True unless the top-level type is application, image, audio or video
pub fn is_strange(content_type: &str) -> bool {
    let top = essence(content_type).split('/').next().unwrap_or_default().to_ascii_lowercase();
    !matches!(top.as_str(), "application" | "image" | "audio" | "video")
}

/// Whether a part of this type must not survive sanitization
pub fn is_disallowed(content_type: &str) -> bool {
    is_forbidden(content_type) || is_strange(content_type)
}

pub fn remapped(content_type: &str) -> Option<&'static str> {
    let essence = essence(content_type);
    REMAPPED
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(essence))
        .map(|(_, to)| *to)
}

/// One content type rewritten to its macro-free equivalent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
    /// Part name for an override, `*.ext` for a default
    pub location: String,
    pub from: String,
    pub to: String,
}

fn part_name(part: &str) -> String {
    format!("/{}", part.trim_start_matches('/'))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    /// (extension, content type)
    defaults: Vec<(String, String)>,
    /// (part name with its leading `/`, content type)
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(xml: &[u8]) -> Result<Self, FormatError> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut types = Self::default();
        let mut saw_root = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(element) | Event::Empty(element) => match element.local_name().as_ref() {
                    b"Types" => saw_root = true,
                    b"Default" => {
                        if let (Some(extension), Some(content_type)) = (
                            xml_attribute(&element, b"Extension")?,
                            xml_attribute(&element, b"ContentType")?,
                        ) {
                            types.defaults.push((extension, content_type));
                        }
                    }
                    b"Override" => {
                        if let (Some(part), Some(content_type)) = (
                            xml_attribute(&element, b"PartName")?,
                            xml_attribute(&element, b"ContentType")?,
                        ) {
                            types.overrides.push((part_name(&part), content_type));
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(FormatError::Corrupted(format!("{} has no Types element", CONTENT_TYPES_PART)));
        }
        Ok(types)
    }

    /// Content type of a part given by its package path (`word/document.xml`)
    pub fn resolve(&self, part: &str) -> Option<&str> {
        let name = part_name(part);
        if let Some((_, content_type)) = self.overrides.iter().find(|(p, _)| p.eq_ignore_ascii_case(&name)) {
            return Some(content_type);
        }

        let file = name.rsplit('/').next().unwrap_or_default();
        let (_, extension) = file.rsplit_once('.')?;
        self.defaults
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(extension))
            .map(|(_, content_type)| content_type.as_str())
    }

    /// Drops overrides whose part is not kept; `keep` sees paths without the leading `/`
    pub fn retain_overrides(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.overrides.retain(|(part, _)| keep(part.trim_start_matches('/')));
    }

    /// Rewrites every macro-enabled main document type in place
    pub fn remap(&mut self) -> Vec<Remap> {
        let overrides = self.overrides.iter_mut().map(|(p, t)| (p.clone(), t));
        let defaults = self.defaults.iter_mut().map(|(e, t)| (format!("*.{}", e), t));

        let mut remaps = Vec::new();
        for (location, content_type) in overrides.chain(defaults) {
            if let Some(to) = remapped(content_type) {
                remaps.push(Remap {
                    location,
                    from: std::mem::replace(content_type, to.to_string()),
                    to: to.to_string(),
                });
            }
        }
        remaps
    }

    /// Adds an extension default unless one already exists
    pub fn ensure_default(&mut self, extension: &str, content_type: &str) {
        if !self.defaults.iter().any(|(e, _)| e.eq_ignore_ascii_case(extension)) {
            self.defaults.push((extension.to_string(), content_type.to_string()));
        }
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    pub fn to_xml(&self) -> Result<Vec<u8>, FormatError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        writer.write_event(Event::Start(BytesStart::new("Types").with_attributes([("xmlns", NAMESPACE)])))?;

        for (extension, content_type) in &self.defaults {
            let element = BytesStart::new("Default")
                .with_attributes([("Extension", extension.as_str()), ("ContentType", content_type.as_str())]);
            writer.write_event(Event::Empty(element))?;
        }
        for (part, content_type) in &self.overrides {
            let element = BytesStart::new("Override")
                .with_attributes([("PartName", part.as_str()), ("ContentType", content_type.as_str())]);
            writer.write_event(Event::Empty(element))?;
        }

        writer.write_event(Event::End(BytesEnd::new("Types")))?;
        Ok(writer.into_inner().into_inner())
    }
}
