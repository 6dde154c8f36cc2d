//! In-memory documents for the integration tests

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use cfb::CompoundFile;
use lopdf::{dictionary, Document, Object, Stream};
use pdx_cdr::{BleachConfig, BleachSession, Sanitizer, SanitizerRegistry};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Default Extension="bin" ContentType="application/vnd.ms-office.vbaProject"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.ms-word.document.macroEnabled.main+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.microsoft.com/office/2006/relationships/vbaProject" Target="vbaProject.bin"/>
</Relationships>"#;

const DOCUMENT: &str = r#"<w:document><w:body><w:p/></w:body></w:document>"#;

pub struct TestFixtures;

impl TestFixtures {
    /// RTF with one embedded object on its second line
    pub const RTF: &'static [u8] = b"{\\rtf1\\ansi\r\n{\\object\\objemb{\\*\\objdata 0105}}\r\n}";

    /// Root sanitizer with every built-in format
    pub fn root() -> Arc<dyn Sanitizer> {
        SanitizerRegistry::with_defaults().build()
    }

    pub fn session() -> BleachSession {
        BleachSession::new(Self::root())
    }

    pub fn session_with(config: BleachConfig) -> BleachSession {
        let root = SanitizerRegistry::from_config(&config).unwrap().build();
        BleachSession::with_config(root, config)
    }

    /// Compound file with the given storages and streams (absolute paths)
    pub fn ole2(storages: &[&str], streams: &[(&str, &[u8])]) -> Vec<u8> {
        let mut file = CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        for storage in storages {
            file.create_storage(storage).unwrap();
        }
        for (path, data) in streams {
            file.create_stream(path).unwrap().write_all(data).unwrap();
        }
        file.flush().unwrap();
        file.into_inner().into_inner()
    }

    pub fn ole2_stream(data: &[u8], path: &str) -> Option<Vec<u8>> {
        let mut file = CompoundFile::open(Cursor::new(data)).unwrap();
        let mut stream = file.open_stream(path).ok()?;
        let mut content = Vec::new();
        stream.read_to_end(&mut content).unwrap();
        Some(content)
    }

    pub fn zip(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, payload) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(payload).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub fn zip_member(data: &[u8], name: &str) -> Option<Vec<u8>> {
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut file = archive.by_name(name).ok()?;
        let mut content = Vec::new();
        file.read_to_end(&mut content).unwrap();
        Some(content)
    }

    pub fn zip_names(data: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    /// `inner` wrapped in `levels` nested ZIP archives
    pub fn nested_zip(inner: &[u8], levels: usize) -> Vec<u8> {
        let mut payload = inner.to_vec();
        for level in 0..levels {
            let name = if level == 0 { "doc.rtf".to_string() } else { format!("level{}.zip", level) };
            payload = Self::zip(&[(name.as_str(), &payload)]);
        }
        payload
    }

    /// Macro-enabled Word package with a VBA project part
    pub fn docm() -> Vec<u8> {
        Self::zip(&[
            ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
            ("_rels/.rels", PACKAGE_RELS.as_bytes()),
            ("word/document.xml", DOCUMENT.as_bytes()),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes()),
            ("word/vbaProject.bin", b"Attribute VB_Name"),
        ])
    }

    fn pdf_skeleton() -> (Document, (u32, u16)) {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        (doc, catalog_id)
    }

    fn save(mut doc: Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// PDF whose open action runs JavaScript
    pub fn scripted_pdf() -> Vec<u8> {
        let (mut doc, catalog_id) = Self::pdf_skeleton();
        let script = doc.add_object(dictionary! {
            "S" => "JavaScript",
            "JS" => Object::string_literal("app.launchURL('http://evil.example')"),
        });
        doc.get_object_mut(catalog_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("OpenAction", script);
        Self::save(doc)
    }

    /// PDF carrying `attachment` as an embedded file; returns it with the stream's object number
    pub fn pdf_with_attachment(attachment: &[u8]) -> (Vec<u8>, (u32, u16)) {
        let (mut doc, catalog_id) = Self::pdf_skeleton();
        let file = doc.add_object(Stream::new(dictionary! { "Type" => "EmbeddedFile" }, attachment.to_vec()));
        let spec = doc.add_object(dictionary! {
            "Type" => "Filespec",
            "F" => Object::string_literal("attachment"),
            "EF" => dictionary! { "F" => file },
        });
        let names = dictionary! {
            "EmbeddedFiles" => dictionary! {
                "Names" => vec![Object::string_literal("attachment"), spec.into()],
            },
        };
        doc.get_object_mut(catalog_id).unwrap().as_dict_mut().unwrap().set("Names", names);
        (Self::save(doc), file)
    }

    pub fn pdf_attachment(data: &[u8], id: (u32, u16)) -> Vec<u8> {
        let doc = Document::load_mem(data).unwrap();
        doc.get_object(id).unwrap().as_stream().unwrap().decompressed_content().unwrap()
    }
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
