//! Error types and handling for the sanitization engine
//!
//! `SanitizeError` is what every public operation returns. Failures raised by
//! the underlying format libraries are collected in `FormatError` and surface
//! wrapped in `SanitizeError::SanitizerFailed`, tagged with the sanitizer that
//! claimed the stream.

use std::{io, result::Result as StdResult, time::Duration};

use thiserror::Error;

/// Custom result type for sanitization operations
pub type Result<T> = StdResult<T, SanitizeError>;

/// Core error type for sanitization operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SanitizeError {
    #[error("Recursion exploit? Sanitization nested {0} levels deep")]
    RecursionLimitExceeded(usize),

    #[error("No sanitizer is able to handle this file")]
    NoApplicableSanitizer,

    #[error("{sanitizer} failed: {cause}")]
    SanitizerFailed {
        sanitizer: String,
        #[source]
        cause: FormatError,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Sanitization did not complete within {0:?}")]
    TimeoutError(Duration),
}

impl SanitizeError {
    /// Wraps a format-level failure for the sanitizer named `sanitizer`
    pub fn failed(sanitizer: impl Into<String>, cause: impl Into<FormatError>) -> Self {
        SanitizeError::SanitizerFailed {
            sanitizer: sanitizer.into(),
            cause: cause.into(),
        }
    }

    /// True when this error is the depth-bomb signal, which must never be swallowed.
    pub fn is_recursion_limit(&self) -> bool {
        matches!(self, SanitizeError::RecursionLimitExceeded(_))
    }

    /// Process exit code used by the CLI adapter.
    pub fn exit_code(&self) -> i32 {
        match self {
            SanitizeError::NoApplicableSanitizer => 2,
            SanitizeError::RecursionLimitExceeded(_) => 3,
            SanitizeError::TimeoutError(_) => 4,
            _ => 1,
        }
    }
}

// -------------------- Format Library Failures --------------------

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FormatError {
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupted structure: {0}")]
    Corrupted(String),

    #[error("Encrypted document: {0}")]
    Encrypted(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}

impl From<quick_xml::events::attributes::AttrError> for FormatError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        FormatError::Xml(quick_xml::Error::InvalidAttr(err))
    }
}
