//! Embedded files (`/EF` streams of file specifications)
//!
//! Each attached file that the session recognises as a document is decoded,
//! sanitized one level deeper and stored back Flate-compressed.

use std::{collections::BTreeSet, io::Write};

use flate2::{write::ZlibEncoder, Compression};
use lopdf::{Object, ObjectId, Stream};
use tracing::{debug, trace, warn};

use super::{actions::Objects, fail};
use crate::{
    error::Result,
    session::SessionContext,
    threat::{Threat, ThreatAction, ThreatSeverity, ThreatType},
};

fn collect(object: &Object, objects: &Objects, found: &mut BTreeSet<ObjectId>) {
    match object {
        Object::Dictionary(dict) => {
            let files = match dict.get(b"EF") {
                Ok(Object::Reference(id)) => objects.get(id),
                Ok(other) => Some(other),
                Err(_) => None,
            };
            if let Some(Object::Dictionary(files)) = files {
                found.extend(files.iter().filter_map(|(_, value)| value.as_reference().ok()));
            }
            for (_, value) in dict.iter() {
                collect(value, objects, found);
            }
        }
        Object::Array(items) => {
            for item in items {
                collect(item, objects, found);
            }
        }
        _ => {}
    }
}

/// Streams referenced from the `/EF` dictionary of any file specification
pub fn embedded_file_streams(objects: &Objects) -> BTreeSet<ObjectId> {
    let mut found = BTreeSet::new();
    for object in objects.values() {
        collect(object, objects, &mut found);
    }
    found
}

fn decode(stream: &Stream) -> lopdf::Result<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content()
    } else {
        Ok(stream.content.clone())
    }
}

fn replace_content(stream: &mut Stream, payload: &[u8]) -> Result<()> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).map_err(fail)?;
    let compressed = encoder.finish().map_err(fail)?;

    stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    stream.dict.remove(b"DecodeParms");
    if let Ok(Object::Dictionary(params)) = stream.dict.get_mut(b"Params") {
        params.set("Size", payload.len() as i64);
    }
    stream.set_content(compressed);
    Ok(())
}

pub fn sanitize_embedded_files(objects: &mut Objects, ctx: &mut SessionContext<'_>) -> Result<()> {
    for id in embedded_file_streams(objects) {
        let stream = match objects.get_mut(&id) {
            Some(Object::Stream(stream)) => stream,
            _ => continue,
        };
        let location = format!("Embedded file {} {}", id.0, id.1);

        let payload = match decode(stream) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%location, error = %err, "Embedded file could not be decoded");
                ctx.record_threat(
                    Threat::builder()
                        .kind(ThreatType::UnrecognizedContent)
                        .severity(ThreatSeverity::Medium)
                        .action(ThreatAction::Ignore)
                        .location(&location)
                        .details(format!("Embedded file could not be decoded: {}", err))
                        .build(),
                );
                continue;
            }
        };

        if !ctx.is_document(&payload) {
            trace!(%location, size = payload.len(), "Embedded file is not a known document");
            continue;
        }

        debug!(%location, size = payload.len(), "Sanitizing embedded file");
        let clean = ctx.sanitize_embedded(&location, &payload)?;
        replace_content(stream, &clean)?;
    }
    Ok(())
}
