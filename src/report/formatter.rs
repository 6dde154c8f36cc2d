//! Report formatter implementation

use std::{fmt::Write as _, io};

use super::SanitizeReport;
use crate::error::Result;

/// Report output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    PlainText,
    Json,
}

/// Formats report data into the supported output formats
pub struct ReportFormatter;

impl ReportFormatter {
    pub fn format(report: &SanitizeReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::PlainText => Ok(Self::to_text(report)),
            ReportFormat::Json => Self::to_json(report),
        }
    }

    fn to_text(report: &SanitizeReport) -> String {
        let mut output = String::new();
        output.push_str("Sanitization Report\n");
        output.push_str("===================\n\n");

        // Writing into a String cannot fail
        let _ = writeln!(output, "Generated:  {}", report.generated_at.to_rfc3339());
        let _ = writeln!(output, "Sanitizer:  {}", report.sanitizer);
        let _ = writeln!(output, "Input:      {} ({} bytes)", report.input_sha256, report.input_size);
        let _ = writeln!(output, "Output:     {} ({} bytes)", report.output_sha256, report.output_size);
        let worst = report
            .worst_severity
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        let _ = writeln!(output, "Threats:    {} (worst: {})", report.threat_count, worst);

        for (kind, count) in &report.threats_by_type {
            let _ = writeln!(output, "  {:<22}{}", kind.to_string(), count);
        }
        if !report.threats.is_empty() {
            output.push('\n');
        }
        for threat in &report.threats {
            let _ = writeln!(output, "{}", threat);
        }
        output
    }

    fn to_json(report: &SanitizeReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report).map_err(io::Error::from)?)
    }
}
