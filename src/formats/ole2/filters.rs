//! Storage and stream filters for OLE2 compound files

use tracing::info;

use crate::{
    filter::{Decision, Entry, EntryFilter, EntryKind, RewriteContext},
    threat::{Threat, ThreatAction, ThreatSeverity, ThreatType},
};

const MACRO_STORAGE: &str = "Macros";
const VBA_MARKER: &str = "VBA";
const OBJECT_POOL: &str = "ObjectPool";
const COMPOUND_OBJECT: &str = "\u{1}CompObj";

/// "Entries: [..]" for storages, "Size: N" for streams
fn describe(entry: &Entry) -> String {
    match entry.kind {
        EntryKind::Container => format!("Entries: [{}]", entry.metadata.children.join(", ")),
        EntryKind::Leaf => format!("Size: {}", entry.size),
    }
}

/// Drops VBA projects: the `Macros` storage and anything with `VBA` in its name
/// (`VBA`, `_VBA_PROJECT_CUR`, `_VBA_PROJECT`, ...).
#[derive(Debug, Default)]
pub struct MacroFilter;

impl MacroFilter {
    pub fn is_macro(name: &str) -> bool {
        name.eq_ignore_ascii_case(MACRO_STORAGE) || name.contains(VBA_MARKER)
    }
}

impl EntryFilter for MacroFilter {
    fn name(&self) -> &str {
        "MacroFilter"
    }

    fn evaluate(&self, entry: &Entry, ctx: &mut RewriteContext<'_, '_>) -> Decision {
        if !Self::is_macro(&entry.name) {
            return Decision::Keep;
        }

        info!(entry = %entry, "Found macros, removing them");
        ctx.record_threat(
            Threat::builder()
                .kind(ThreatType::ActiveContent)
                .severity(ThreatSeverity::Extreme)
                .action(ThreatAction::Remove)
                .location(&entry.name)
                .details(describe(entry))
                .build(),
        );
        Decision::Reject
    }
}

/// Drops embedded OLE objects (`ObjectPool` storage, `\x01CompObj` stream)
#[derive(Debug, Default)]
pub struct ObjectFilter;

impl ObjectFilter {
    pub fn is_object(name: &str) -> bool {
        name.eq_ignore_ascii_case(OBJECT_POOL) || name.eq_ignore_ascii_case(COMPOUND_OBJECT)
    }
}

impl EntryFilter for ObjectFilter {
    fn name(&self) -> &str {
        "ObjectFilter"
    }

    fn evaluate(&self, entry: &Entry, ctx: &mut RewriteContext<'_, '_>) -> Decision {
        if !Self::is_object(&entry.name) {
            return Decision::Keep;
        }

        info!(entry = %entry, "Found compound objects, removing them");
        ctx.record_threat(
            Threat::builder()
                .kind(ThreatType::ExternalContent)
                .severity(ThreatSeverity::High)
                .action(ThreatAction::Remove)
                .location(&entry.name)
                .details(describe(entry))
                .build(),
        );
        Decision::Reject
    }
}
