//! Pipeline of format sanitizers over a single buffered document

use std::{borrow::Cow, io::Write, sync::Arc};

use tracing::{debug, instrument, trace};

use super::Sanitizer;
use crate::{error::Result, session::SessionContext};

/// Runs every member that claims the current stage, in order.
///
/// Each stage is fully materialized before the next member inspects it. When
/// no member claims the input the output is a byte-for-byte copy.
#[derive(Debug)]
pub struct CompositeSanitizer {
    members: Vec<Arc<dyn Sanitizer>>,
    name: String,
}

impl CompositeSanitizer {
    pub fn new(members: Vec<Arc<dyn Sanitizer>>) -> Self {
        let names: Vec<&str> = members.iter().map(|m| m.name()).collect();
        let name = format!("Composite[{}]", names.join(", "));
        Self { members, name }
    }

    pub fn members(&self) -> &[Arc<dyn Sanitizer>] {
        &self.members
    }
}

impl Sanitizer for CompositeSanitizer {
    fn detects(&self, input: &[u8]) -> bool {
        self.members.iter().any(|m| m.detects(input))
    }

    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(depth = ctx.depth(), size = input.len()))]
    fn sanitize(&self, input: &[u8], output: &mut dyn Write, ctx: &mut SessionContext<'_>) -> Result<()> {
        let mut stage: Cow<'_, [u8]> = Cow::Borrowed(input);

        for member in &self.members {
            if !member.detects(&stage) {
                trace!(sanitizer = member.name(), "Not claimed");
                continue;
            }

            debug!(sanitizer = member.name(), "Running stage");
            let mut next = Vec::with_capacity(stage.len());
            member.sanitize(&stage, &mut next, ctx)?;
            stage = Cow::Owned(next);
        }

        output.write_all(&stage)?;
        Ok(())
    }
}
