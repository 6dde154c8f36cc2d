//! Recursive copy of a container through a filter chain
//!
//! The source is never modified. Entries that pass the chain are copied into
//! a fresh destination; leaf payloads may be rewritten by payload transforms
//! and, when they are documents in their own right, are routed back through
//! the session before being stored.

use std::collections::BTreeMap;

use tracing::{debug, instrument, trace};

use super::{Decision, Entry, EntryKind, FilterChain};
use crate::{error::Result, session::SessionContext, threat::Threat};

/// Read side of a container document
pub trait SourceContainer {
    /// Children of `parent`, or the top level when `parent` is `None`
    fn entries(&mut self, parent: Option<&Entry>) -> Result<Vec<Entry>>;

    /// Payload of a leaf entry
    fn read(&mut self, entry: &Entry) -> Result<Vec<u8>>;
}

/// Write side of a container document
pub trait DestinationContainer {
    fn create_container(&mut self, entry: &Entry) -> Result<()>;

    fn write_leaf(&mut self, entry: &Entry, payload: &[u8]) -> Result<()>;

    /// Stores an inert object standing in for removed content
    fn write_placeholder(&mut self, placeholder: &Placeholder) -> Result<()>;
}

/// Rewrites the payload of kept leaves
pub trait PayloadTransform: Send + Sync {
    fn applies(&self, entry: &Entry) -> bool;

    /// Returns the replacement payload, or `None` to keep it unchanged
    fn transform(&self, entry: &Entry, payload: &[u8], ctx: &mut RewriteContext<'_, '_>) -> Result<Option<Vec<u8>>>;
}

/// Inert object substituted for removed content that is still referenced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Destination path; placeholders sharing a path are stored once
    pub path: String,
    /// Identifier of the reference that now points at the placeholder
    pub id: String,
    pub content_type: Option<String>,
    pub payload: Vec<u8>,
}

/// Per-rewrite state shared by filters and transforms
pub struct RewriteContext<'a, 's> {
    session: &'a mut SessionContext<'s>,
    placeholders: BTreeMap<String, Placeholder>,
    rejected: Vec<String>,
}

impl<'a, 's> RewriteContext<'a, 's> {
    pub fn new(session: &'a mut SessionContext<'s>) -> Self {
        Self {
            session,
            placeholders: BTreeMap::new(),
            rejected: Vec::new(),
        }
    }

    pub fn record_threat(&mut self, threat: Threat) {
        self.session.record_threat(threat);
    }

    pub fn session(&mut self) -> &mut SessionContext<'s> {
        &mut *self.session
    }

    /// Registers a placeholder; a later one with the same path replaces it
    pub fn add_placeholder(&mut self, placeholder: Placeholder) {
        trace!(path = %placeholder.path, id = %placeholder.id, "Placeholder registered");
        self.placeholders.insert(placeholder.path.clone(), placeholder);
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.placeholders.values()
    }

    /// Paths of entries the chain rejected, in discovery order
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }
}

/// Copies a source container into a destination, applying filters and transforms
#[derive(Debug)]
pub struct ContainerRewriter {
    chain: FilterChain,
    transforms: Vec<Box<dyn PayloadTransform>>,
    sanitize_embedded: bool,
}

impl ContainerRewriter {
    pub fn new(chain: FilterChain) -> Self {
        Self {
            chain,
            transforms: Vec::new(),
            sanitize_embedded: true,
        }
    }

    pub fn with_transform(mut self, transform: impl PayloadTransform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Whether leaves that are documents themselves go back through the session
    pub fn sanitize_embedded(mut self, enabled: bool) -> Self {
        self.sanitize_embedded = enabled;
        self
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    /// Walks `source` depth-first and returns the filled destination.
    ///
    /// Uses an explicit stack so hostile nesting inside one container cannot
    /// grow the call stack.
    #[instrument(skip_all)]
    pub fn rewrite<S, D>(&self, source: &mut S, mut destination: D, ctx: &mut RewriteContext<'_, '_>) -> Result<D>
    where
        S: SourceContainer,
        D: DestinationContainer,
    {
        let mut pending: Vec<Entry> = source.entries(None)?;
        pending.reverse();

        while let Some(entry) = pending.pop() {
            if self.chain.evaluate(&entry, ctx) == Decision::Reject {
                ctx.rejected.push(entry.path.clone());
                continue;
            }

            match entry.kind {
                EntryKind::Container => {
                    trace!(entry = %entry, "Copying container");
                    destination.create_container(&entry)?;
                    let mut children = source.entries(Some(&entry))?;
                    children.reverse();
                    pending.extend(children);
                }
                EntryKind::Leaf => {
                    let payload = source.read(&entry)?;
                    let payload = self.process_leaf(&entry, payload, ctx)?;
                    destination.write_leaf(&entry, &payload)?;
                }
            }
        }

        for placeholder in ctx.placeholders.values() {
            debug!(path = %placeholder.path, id = %placeholder.id, "Writing placeholder");
            destination.write_placeholder(placeholder)?;
        }

        Ok(destination)
    }

    fn process_leaf(&self, entry: &Entry, mut payload: Vec<u8>, ctx: &mut RewriteContext<'_, '_>) -> Result<Vec<u8>> {
        for transform in &self.transforms {
            if !transform.applies(entry) {
                continue;
            }
            if let Some(rewritten) = transform.transform(entry, &payload, ctx)? {
                payload = rewritten;
            }
        }

        if self.sanitize_embedded && ctx.session.is_document(&payload) {
            debug!(entry = %entry, "Sanitizing embedded document");
            payload = ctx.session.sanitize_embedded(&entry.path, &payload)?;
        }

        Ok(payload)
    }
}

impl std::fmt::Debug for dyn PayloadTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PayloadTransform")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::BleachConfig,
        error::SanitizeError,
        filter::EntryFilter,
        sanitizer::Sanitizer,
        threat::{ThreatAction, ThreatLedger, ThreatType},
    };
    use std::collections::BTreeMap;
    use std::io::Write;

    /// Flat map of path -> payload; paths ending in `/` are containers.
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Tree(BTreeMap<String, Vec<u8>>);

    impl Tree {
        fn of(items: &[(&str, &str)]) -> Self {
            Tree(items.iter().map(|(p, d)| (p.to_string(), d.as_bytes().to_vec())).collect())
        }
    }

    impl SourceContainer for Tree {
        fn entries(&mut self, parent: Option<&Entry>) -> Result<Vec<Entry>> {
            let prefix = parent.map(|p| p.path.clone()).unwrap_or_default();
            Ok(self
                .0
                .iter()
                .filter(|(path, _)| {
                    let rest = match path.strip_prefix(&prefix) {
                        Some(rest) if !rest.is_empty() => rest,
                        _ => return false,
                    };
                    !rest.trim_end_matches('/').contains('/')
                })
                .map(|(path, data)| {
                    if path.ends_with('/') {
                        Entry::container(path.clone())
                    } else {
                        Entry::leaf(path.clone(), data.len() as u64)
                    }
                })
                .collect())
        }

        fn read(&mut self, entry: &Entry) -> Result<Vec<u8>> {
            Ok(self.0.get(&entry.path).cloned().unwrap_or_default())
        }
    }

    impl DestinationContainer for Tree {
        fn create_container(&mut self, entry: &Entry) -> Result<()> {
            self.0.insert(entry.path.clone(), Vec::new());
            Ok(())
        }

        fn write_leaf(&mut self, entry: &Entry, payload: &[u8]) -> Result<()> {
            self.0.insert(entry.path.clone(), payload.to_vec());
            Ok(())
        }

        fn write_placeholder(&mut self, placeholder: &Placeholder) -> Result<()> {
            self.0.insert(placeholder.path.clone(), placeholder.payload.clone());
            Ok(())
        }
    }

    struct RejectMacros;

    impl EntryFilter for RejectMacros {
        fn name(&self) -> &str {
            "RejectMacros"
        }

        fn evaluate(&self, entry: &Entry, ctx: &mut RewriteContext<'_, '_>) -> Decision {
            if !entry.name.eq_ignore_ascii_case("macros") {
                return Decision::Keep;
            }
            ctx.record_threat(
                Threat::builder()
                    .kind(ThreatType::ActiveContent)
                    .action(ThreatAction::Remove)
                    .location(&entry.path)
                    .build(),
            );
            ctx.add_placeholder(Placeholder {
                path: "placeholder".into(),
                id: entry.name.clone(),
                content_type: None,
                payload: b"inert".to_vec(),
            });
            Decision::Reject
        }
    }

    struct Upper;

    impl PayloadTransform for Upper {
        fn applies(&self, entry: &Entry) -> bool {
            entry.name.ends_with(".txt")
        }

        fn transform(&self, _entry: &Entry, payload: &[u8], _ctx: &mut RewriteContext<'_, '_>) -> Result<Option<Vec<u8>>> {
            Ok(Some(payload.to_ascii_uppercase()))
        }
    }

    /// Treats payloads starting with `!` as documents; `!!` always fails,
    /// `!deep` blows the recursion limit.
    #[derive(Debug)]
    struct Bang;

    impl Sanitizer for Bang {
        fn detects(&self, input: &[u8]) -> bool {
            input.first() == Some(&b'!')
        }

        fn name(&self) -> &str {
            "Bang"
        }

        fn sanitize(&self, input: &[u8], output: &mut dyn Write, _ctx: &mut SessionContext<'_>) -> Result<()> {
            if input.starts_with(b"!!") {
                return Err(SanitizeError::failed("Bang", crate::error::FormatError::Corrupted("bad".into())));
            }
            if input.starts_with(b"!deep") {
                return Err(SanitizeError::RecursionLimitExceeded(11));
            }
            output.write_all(b"clean")?;
            Ok(())
        }
    }

    fn run(source: &Tree) -> (Result<Tree>, ThreatLedger) {
        let mut ledger = ThreatLedger::new();
        let config = BleachConfig::default();
        let mut session = SessionContext::new(&Bang, &mut ledger, &config);
        let result = {
            let mut ctx = RewriteContext::new(&mut session);
            let rewriter = ContainerRewriter::new(FilterChain::new().with(RejectMacros)).with_transform(Upper);
            let mut source = source.clone();
            rewriter.rewrite(&mut source, Tree::default(), &mut ctx)
        };
        drop(session);
        (result, ledger)
    }

    #[test]
    fn test_rejected_container_and_children_are_dropped() {
        let source = Tree::of(&[
            ("Macros/", ""),
            ("Macros/VBA/", ""),
            ("Macros/VBA/Module1", "Sub AutoOpen()"),
            ("Normal", "body"),
        ]);
        let (result, ledger) = run(&source);
        let output = result.unwrap();

        assert_eq!(
            output,
            Tree::of(&[("Normal", "body"), ("placeholder", "inert")])
        );
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.as_slice()[0].kind(), ThreatType::ActiveContent);
    }

    #[test]
    fn test_clean_container_is_copied_unchanged() {
        let source = Tree::of(&[("dir/", ""), ("dir/a", "1"), ("b", "2")]);
        let (result, ledger) = run(&source);
        assert_eq!(result.unwrap(), source);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_transforms_and_embedded_documents() {
        let source = Tree::of(&[("notes.txt", "hello"), ("inner", "!doc"), ("broken", "!!x")]);
        let (result, ledger) = run(&source);
        let output = result.unwrap();

        assert_eq!(output.0["notes.txt"], b"HELLO".to_vec());
        assert_eq!(output.0["inner"], b"clean".to_vec());
        assert_eq!(output.0["broken"], b"!!x".to_vec());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.as_slice()[0].action(), ThreatAction::Ignore);
    }

    #[test]
    fn test_recursion_limit_is_not_swallowed() {
        let source = Tree::of(&[("ok", "1"), ("bomb", "!deep")]);
        let (result, _) = run(&source);
        assert!(result.unwrap_err().is_recursion_limit());
    }
}
