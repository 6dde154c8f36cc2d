//! Content disarm & reconstruction engine
//!
//! A `BleachSession` runs a root sanitizer (normally the composite built by
//! `SanitizerRegistry`) over a document. Format sanitizers rewrite OLE2,
//! OOXML, PDF, RTF and ZIP inputs into clean copies, recording every removed
//! or altered piece of content as a `Threat`, and hand embedded documents
//! back to the session so they are cleaned the same way.

// Core engine
pub mod config;
pub mod error;
pub mod session;
pub mod threat;

// Sanitizers and the container plumbing they share
pub mod filter;
pub mod formats;
pub mod sanitizer;

// File adapter and reporting
pub mod hash_utils;
pub mod pipeline;
pub mod report;

// Shared utilities
pub mod utils;

// Re-exports for crate consumers
pub use config::{BleachConfig, FormatKind, UnrecognizedPolicy};
pub use error::{FormatError, Result, SanitizeError};
pub use pipeline::Pipeline;
pub use report::{ReportFormat, ReportFormatter, SanitizeReport};
pub use sanitizer::{CompositeSanitizer, Sanitizer, SanitizerRegistry};
pub use session::{BleachSession, SessionContext};
pub use threat::{Threat, ThreatAction, ThreatLedger, ThreatSeverity, ThreatType};
