//! Format sanitizers and the container plumbing they share

pub mod archive;
pub mod ole2;
pub mod ooxml;
pub mod pdf;
pub mod rtf;
pub mod zip_container;

pub use archive::ArchiveSanitizer;
pub use ole2::Ole2Sanitizer;
pub use ooxml::OoxmlSanitizer;
pub use pdf::PdfSanitizer;
pub use rtf::RtfSanitizer;
