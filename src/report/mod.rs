//! Sanitization report: what went in, what came out and what was removed

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    hash_utils::{sha256_hex, verify_sha256},
    session::BleachSession,
    threat::{ThreatLedger, ThreatSeverity, ThreatType},
};

pub mod formatter;

pub use formatter::{ReportFormat, ReportFormatter};

/// Summary of one completed sanitize request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizeReport {
    pub generated_at: DateTime<Utc>,
    pub sanitizer: String,
    pub input_sha256: String,
    pub output_sha256: String,
    pub input_size: usize,
    pub output_size: usize,
    pub threat_count: usize,
    pub worst_severity: Option<ThreatSeverity>,
    pub threats_by_type: BTreeMap<ThreatType, usize>,
    pub threats: ThreatLedger,
}

impl SanitizeReport {
    pub fn new(sanitizer: &str, input: &[u8], output: &[u8], ledger: &ThreatLedger) -> Self {
        Self {
            generated_at: Utc::now(),
            sanitizer: sanitizer.to_string(),
            input_sha256: sha256_hex(input),
            output_sha256: sha256_hex(output),
            input_size: input.len(),
            output_size: output.len(),
            threat_count: ledger.len(),
            worst_severity: ledger.worst_severity(),
            threats_by_type: ledger.count_by_type(),
            threats: ledger.clone(),
        }
    }

    /// Report for a session that just produced `output` from `input`
    pub fn from_session(session: &BleachSession, input: &[u8], output: &[u8]) -> Self {
        Self::new(session.sanitizer_name(), input, output, session.ledger())
    }

    /// True when the output differs from the input
    pub fn modified(&self) -> bool {
        self.input_sha256 != self.output_sha256
    }

    /// True when `data` is the output this report was made for
    pub fn matches_output(&self, data: &[u8]) -> bool {
        data.len() == self.output_size && verify_sha256(data, &self.output_sha256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threat::{Threat, ThreatAction};

    #[test]
    fn test_report_summarizes_ledger() {
        let mut ledger = ThreatLedger::new();
        ledger.record(
            Threat::builder()
                .kind(ThreatType::ActiveContent)
                .severity(ThreatSeverity::Extreme)
                .action(ThreatAction::Remove)
                .location("Macros")
                .build(),
        );
        ledger.record(Threat::builder().kind(ThreatType::ExternalContent).build());

        let report = SanitizeReport::new("Office Bleach", b"in", b"out", &ledger);
        assert_eq!(report.threat_count, 2);
        assert_eq!(report.worst_severity, Some(ThreatSeverity::Extreme));
        assert_eq!(report.threats_by_type[&ThreatType::ActiveContent], 1);
        assert_eq!(report.input_sha256.len(), 64);
        assert!(report.modified());
    }

    #[test]
    fn test_untouched_input_is_not_modified() {
        let report = SanitizeReport::new("Composite", b"same", b"same", &ThreatLedger::new());
        assert!(!report.modified());
        assert_eq!(report.worst_severity, None);
    }

    #[test]
    fn test_matches_only_its_own_output() {
        let report = SanitizeReport::new("RTF Bleach", b"{\\object}", b"{\\*\\0bject}", &ThreatLedger::new());
        assert!(report.matches_output(b"{\\*\\0bject}"));
        assert!(!report.matches_output(b"{\\object}"));
    }
}
