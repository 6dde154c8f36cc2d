//! Append-only threat ledger owned by one session

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Threat, ThreatSeverity, ThreatType};

/// Ordered record of every threat found during one top-level sanitize call.
///
/// There is no way to remove or edit an entry once recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreatLedger {
    threats: Vec<Threat>,
}

impl ThreatLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, threat: Threat) {
        trace!(
            kind = %threat.kind(),
            severity = %threat.severity(),
            action = %threat.action(),
            location = threat.location(),
            "Threat recorded: {}",
            threat.details()
        );
        self.threats.push(threat);
    }

    pub fn len(&self) -> usize {
        self.threats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threats.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threat> {
        self.threats.iter()
    }

    pub fn as_slice(&self) -> &[Threat] {
        &self.threats
    }

    /// Number of threats per type; types with no threats are omitted
    pub fn count_by_type(&self) -> BTreeMap<ThreatType, usize> {
        let mut counts = BTreeMap::new();
        for threat in &self.threats {
            *counts.entry(threat.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Threats at or above `severity`, in discovery order
    pub fn at_least(&self, severity: ThreatSeverity) -> impl Iterator<Item = &Threat> {
        self.threats.iter().filter(move |t| t.severity() >= severity)
    }

    pub fn worst_severity(&self) -> Option<ThreatSeverity> {
        self.threats.iter().map(Threat::severity).max()
    }
}

impl<'a> IntoIterator for &'a ThreatLedger {
    type Item = &'a Threat;
    type IntoIter = std::slice::Iter<'a, Threat>;

    fn into_iter(self) -> Self::IntoIter {
        self.threats.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threat::ThreatAction;

    fn threat(kind: ThreatType, severity: ThreatSeverity) -> Threat {
        Threat::builder()
            .kind(kind)
            .severity(severity)
            .action(ThreatAction::Remove)
            .location("test")
            .build()
    }

    #[test]
    fn test_empty_ledger() {
        let ledger = ThreatLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.worst_severity(), None);
        assert!(ledger.count_by_type().is_empty());
    }

    #[test]
    fn test_record_keeps_discovery_order() {
        let mut ledger = ThreatLedger::new();
        ledger.record(threat(ThreatType::BinaryContent, ThreatSeverity::High));
        ledger.record(threat(ThreatType::ActiveContent, ThreatSeverity::Low));

        let kinds: Vec<_> = ledger.iter().map(Threat::kind).collect();
        assert_eq!(kinds, vec![ThreatType::BinaryContent, ThreatType::ActiveContent]);
    }

    #[test]
    fn test_counts_and_filters() {
        let mut ledger = ThreatLedger::new();
        ledger.record(threat(ThreatType::ActiveContent, ThreatSeverity::Extreme));
        ledger.record(threat(ThreatType::ActiveContent, ThreatSeverity::High));
        ledger.record(threat(ThreatType::ExternalContent, ThreatSeverity::Low));

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.count_by_type()[&ThreatType::ActiveContent], 2);
        assert_eq!(ledger.count_by_type()[&ThreatType::ExternalContent], 1);
        assert_eq!(ledger.at_least(ThreatSeverity::High).count(), 2);
        assert_eq!(ledger.worst_severity(), Some(ThreatSeverity::Extreme));
    }
}
