//! Format sanitizer capability and its dispatchers

use std::{fmt::Debug, io::Write};

use crate::{error::Result, session::SessionContext};

pub mod composite;
pub mod registry;

pub use composite::CompositeSanitizer;
pub use registry::SanitizerRegistry;

/// One format's disarm-and-rebuild logic.
///
/// Implementations are stateless with respect to a request: everything a call
/// learns goes into the `SessionContext`, so one instance can serve any number
/// of sessions concurrently.
pub trait Sanitizer: Debug + Send + Sync {
    /// Cheap header check. Must never fail; malformed input simply returns false.
    fn detects(&self, input: &[u8]) -> bool;

    /// Stable name used in logs and reports
    fn name(&self) -> &str;

    /// Rewrites `input` into `output`, recording every removal in `ctx`.
    fn sanitize(&self, input: &[u8], output: &mut dyn Write, ctx: &mut SessionContext<'_>) -> Result<()>;
}
