//! Action removal
//!
//! Two passes over a copy of the object map. The structural pass follows the
//! document's own layout (catalog, pages, annotations, form fields, outline)
//! so each removal can be reported with a meaningful location. The crawl then
//! visits every object and strips whatever script or launch action is left.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::{
    session::SessionContext,
    threat::{Threat, ThreatAction, ThreatSeverity, ThreatType},
};

pub type Objects = BTreeMap<ObjectId, Object>;

type Triggers = [(&'static [u8], &'static str)];

const CATALOG_TRIGGERS: [(&[u8], &str); 5] = [
    (b"DP", "Action after printing"),
    (b"DS", "Action after saving"),
    (b"WC", "Action before closing"),
    (b"WP", "Action before printing"),
    (b"WS", "Action before saving"),
];

const PAGE_TRIGGERS: [(&[u8], &str); 2] = [(b"C", "Action when page is closed"), (b"O", "Action when page is opened")];

const ANNOTATION_TRIGGERS: [(&[u8], &str); 10] = [
    (b"Bl", "Action when annotation loses the input focus"),
    (b"D", "Action when mouse button is pressed inside the annotation's active area"),
    (b"E", "Action when the cursor enters the annotation's active area"),
    (b"Fo", "Action when the annotation receives the input focus"),
    (b"PC", "Action when the page containing the annotation is closed"),
    (b"PI", "Action when the page containing the annotation is no longer visible"),
    (b"PO", "Action when the page containing the annotation is opened"),
    (b"PV", "Action the page containing the annotation becomes visible"),
    (b"U", "Action when the mouse button is released inside the annotation's active area"),
    (b"X", "Action when the cursor exits the annotation's active area"),
];

const FIELD_TRIGGERS: [(&[u8], &str); 4] = [
    (b"C", "Action on value change"),
    (b"F", "Action to format the value"),
    (b"K", "Action when the user types a keystroke"),
    (b"V", "Action when the field's value is changed"),
];

const SCRIPT_KEYS: [&[u8]; 2] = [b"JS", b"JavaScript"];

fn record(ctx: &mut SessionContext<'_>, location: &str, details: &str) {
    ctx.record_threat(
        Threat::builder()
            .kind(ThreatType::ActiveContent)
            .severity(ThreatSeverity::High)
            .action(ThreatAction::Remove)
            .location(location)
            .details(details)
            .build(),
    );
}

pub(crate) fn dict_of(object: &Object) -> Option<&Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

fn dict_of_mut(object: &mut Object) -> Option<&mut Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&mut stream.dict),
        _ => None,
    }
}

/// Where a dictionary lives: an object of its own, or inline under a key of one
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Object(ObjectId),
    Inline(ObjectId, Vec<u8>),
}

impl Slot {
    fn get<'a>(&self, objects: &'a Objects) -> Option<&'a Dictionary> {
        match self {
            Slot::Object(id) => objects.get(id).and_then(dict_of),
            Slot::Inline(owner, key) => objects
                .get(owner)
                .and_then(dict_of)?
                .get(key)
                .ok()
                .and_then(dict_of),
        }
    }

    fn get_mut<'a>(&self, objects: &'a mut Objects) -> Option<&'a mut Dictionary> {
        match self {
            Slot::Object(id) => objects.get_mut(id).and_then(dict_of_mut),
            Slot::Inline(owner, key) => objects
                .get_mut(owner)
                .and_then(dict_of_mut)?
                .get_mut(key)
                .ok()
                .and_then(dict_of_mut),
        }
    }
}

/// Slot of the dictionary stored under `key` of object `owner`
fn child_slot(objects: &Objects, owner: ObjectId, key: &[u8]) -> Option<Slot> {
    match objects.get(&owner).and_then(dict_of)?.get(key).ok()? {
        Object::Reference(id) => Some(Slot::Object(*id)),
        Object::Dictionary(_) => Some(Slot::Inline(owner, key.to_vec())),
        _ => None,
    }
}

/// References held by an array stored, directly or indirectly, under `key`
fn references_under(objects: &Objects, dict: &Dictionary, key: &[u8]) -> Vec<ObjectId> {
    let array = match dict.get(key) {
        Ok(Object::Array(items)) => items,
        Ok(Object::Reference(id)) => match objects.get(id) {
            Some(Object::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    array.iter().filter_map(|item| item.as_reference().ok()).collect()
}

fn subtype(objects: &Objects, id: ObjectId) -> Option<Vec<u8>> {
    let dict = objects.get(&id).and_then(dict_of)?;
    dict.get(b"Subtype").and_then(Object::as_name).ok().map(<[u8]>::to_vec)
}

/// Removes `key` from the dictionary in `slot`, recording one threat
fn strip(objects: &mut Objects, slot: &Slot, key: &[u8], location: &str, details: &str, ctx: &mut SessionContext<'_>) {
    let removed = slot.get_mut(objects).and_then(|dict| dict.remove(key));
    if let Some(value) = removed {
        debug!("Found and removed {} ({}), was {:?}", details, location, value);
        record(ctx, location, details);
    }
}

/// Removes the `/AA` dictionary, recording one threat per trigger it held
fn strip_additional_actions(
    objects: &mut Objects,
    slot: &Slot,
    triggers: &Triggers,
    location: &str,
    ctx: &mut SessionContext<'_>,
) {
    let actions = match slot.get_mut(objects).and_then(|dict| dict.remove(b"AA")) {
        Some(actions) => actions,
        None => return,
    };

    let held = match &actions {
        Object::Reference(id) => objects.get(id).and_then(dict_of),
        other => dict_of(other),
    };
    let keys: Vec<Vec<u8>> = held.map(|d| d.iter().map(|(k, _)| k.clone()).collect()).unwrap_or_default();

    if keys.is_empty() {
        record(ctx, location, "Additional Actions");
        return;
    }
    for key in keys {
        let details = triggers
            .iter()
            .find(|(trigger, _)| *trigger == key.as_slice())
            .map(|(_, details)| details.to_string())
            .unwrap_or_else(|| format!("Additional action /{}", String::from_utf8_lossy(&key)));
        debug!("Found and removed {} ({})", details, location);
        record(ctx, location, &details);
    }
}

fn clean_annotation(objects: &mut Objects, id: ObjectId, ctx: &mut SessionContext<'_>) {
    let slot = Slot::Object(id);
    match subtype(objects, id).as_deref() {
        Some(b"Link") => strip(objects, &slot, b"A", "Annotation", "External link", ctx),
        Some(b"Widget") => {
            strip(objects, &slot, b"A", "Annotation", "External widget", ctx);
            strip_additional_actions(objects, &slot, &ANNOTATION_TRIGGERS, "Annotation", ctx);
        }
        _ => {}
    }
}

fn clean_pages(document: &Document, objects: &mut Objects, ctx: &mut SessionContext<'_>) {
    for page_id in document.get_pages().into_values() {
        let page = Slot::Object(page_id);
        strip_additional_actions(objects, &page, &PAGE_TRIGGERS, "Page Actions", ctx);

        let annotations = match page.get(objects) {
            Some(dict) => references_under(objects, dict, b"Annots"),
            None => continue,
        };
        for annotation in annotations {
            clean_annotation(objects, annotation, ctx);
        }
    }
}

fn clean_fields(objects: &mut Objects, form: &Slot, ctx: &mut SessionContext<'_>) {
    let mut pending = match form.get(objects) {
        Some(dict) => references_under(objects, dict, b"Fields"),
        None => {
            debug!("No AcroForms found");
            return;
        }
    };
    let mut visited = BTreeSet::new();

    while let Some(field) = pending.pop() {
        if !visited.insert(field) {
            continue;
        }
        let slot = Slot::Object(field);
        strip_additional_actions(objects, &slot, &FIELD_TRIGGERS, "FormAdditionalActions", ctx);
        clean_annotation(objects, field, ctx);

        if let Some(dict) = slot.get(objects) {
            pending.extend(references_under(objects, dict, b"Kids"));
        }
    }
}

fn clean_outline(objects: &mut Objects, outlines: &Slot, ctx: &mut SessionContext<'_>) {
    let first = |dict: &Dictionary| dict.get(b"First").and_then(Object::as_reference).ok();
    let mut pending: Vec<ObjectId> = outlines.get(objects).and_then(first).into_iter().collect();
    let mut visited = BTreeSet::new();

    while let Some(item) = pending.pop() {
        if !visited.insert(item) {
            continue;
        }
        let slot = Slot::Object(item);
        strip(objects, &slot, b"A", "DocumentOutline Item Action", "Action", ctx);

        if let Some(dict) = slot.get(objects) {
            pending.extend(first(dict));
            pending.extend(dict.get(b"Next").and_then(Object::as_reference).ok());
        }
    }
}

/// Removes the actions reachable from the document structure
pub fn clean_document_actions(document: &Document, objects: &mut Objects, ctx: &mut SessionContext<'_>) {
    let catalog_id = match document.trailer.get(b"Root").and_then(Object::as_reference) {
        Ok(id) => id,
        Err(_) => {
            warn!("Document has no catalog, skipping structural cleanup");
            return;
        }
    };
    let catalog = Slot::Object(catalog_id);

    strip(objects, &catalog, b"OpenAction", "Document Catalog", "OpenAction", ctx);
    strip_additional_actions(objects, &catalog, &CATALOG_TRIGGERS, "DocumentCatalogAdditionalActions", ctx);

    if let Some(names) = child_slot(objects, catalog_id, b"Names") {
        strip(objects, &names, b"JavaScript", "Named JavaScriptAction", "Action", ctx);
    }

    clean_pages(document, objects, ctx);

    if let Some(form) = child_slot(objects, catalog_id, b"AcroForm") {
        clean_fields(objects, &form, ctx);
    }
    if let Some(outlines) = child_slot(objects, catalog_id, b"Outlines") {
        clean_outline(objects, &outlines, ctx);
    }
}

fn crawl_dictionary(dict: &mut Dictionary, location: &str, ctx: &mut SessionContext<'_>) {
    for key in SCRIPT_KEYS {
        if dict.remove(key).is_some() {
            debug!("Found and removed Javascript code in {}", location);
            record(ctx, location, "JS Code");
        }
    }
    if dict.remove(b"AA").is_some() {
        debug!("Found and removed Additional Actions in {}", location);
        record(ctx, location, "Additional Actions");
    }

    let action = dict.get(b"S").and_then(Object::as_name).ok().map(<[u8]>::to_vec);
    let details = match action.as_deref() {
        Some(b"JavaScript") => Some("JS Code"),
        Some(b"Launch") => Some("Launch action"),
        _ => None,
    };
    if let Some(details) = details {
        dict.remove(b"S");
        debug!("Found and removed {} in {}", details, location);
        record(ctx, location, details);
    }

    for (_, value) in dict.iter_mut() {
        crawl_object(value, location, ctx);
    }
}

fn crawl_object(object: &mut Object, location: &str, ctx: &mut SessionContext<'_>) {
    match object {
        Object::Dictionary(dict) => crawl_dictionary(dict, location, ctx),
        Object::Stream(stream) => crawl_dictionary(&mut stream.dict, location, ctx),
        Object::Array(items) => {
            for item in items {
                crawl_object(item, location, ctx);
            }
        }
        _ => {}
    }
}

/// Strips every remaining script, additional action and launch action
pub fn crawl(objects: &mut Objects, ctx: &mut SessionContext<'_>) {
    for (&(number, generation), object) in objects.iter_mut() {
        crawl_object(object, &format!("Object {} {}", number, generation), ctx);
    }
}
