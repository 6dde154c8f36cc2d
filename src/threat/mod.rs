//! Threat records produced while disarming a document
//!
//! A `Threat` is created by a format sanitizer at the moment it removes or
//! alters a piece of content and is never mutated afterwards. Threats are
//! collected, in discovery order, by the session's `ThreatLedger`.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod ledger;

pub use ledger::ThreatLedger;

/// Category of content that was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatType {
    /// Executable content: macros, scripts, DDE, ActiveX
    ActiveContent,
    /// References to resources outside the document
    ExternalContent,
    /// Opaque embedded binaries such as OLE objects
    BinaryContent,
    /// Content the sanitizer could not classify
    UnrecognizedContent,
}

impl ThreatType {
    pub const ALL: [ThreatType; 4] = [
        ThreatType::ActiveContent,
        ThreatType::ExternalContent,
        ThreatType::BinaryContent,
        ThreatType::UnrecognizedContent,
    ];
}

impl fmt::Display for ThreatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreatType::ActiveContent => "ACTIVE_CONTENT",
            ThreatType::ExternalContent => "EXTERNAL_CONTENT",
            ThreatType::BinaryContent => "BINARY_CONTENT",
            ThreatType::UnrecognizedContent => "UNRECOGNIZED_CONTENT",
        };
        write!(f, "{}", name)
    }
}

/// How bad a threat is; ordered by weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreatSeverity {
    Low,
    Medium,
    High,
    Extreme,
}

impl ThreatSeverity {
    pub fn weight(&self) -> u8 {
        match self {
            ThreatSeverity::Low => 1,
            ThreatSeverity::Medium => 3,
            ThreatSeverity::High => 5,
            ThreatSeverity::Extreme => 10,
        }
    }
}

impl PartialOrd for ThreatSeverity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ThreatSeverity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.weight().cmp(&other.weight())
    }
}

impl fmt::Display for ThreatSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreatSeverity::Low => "LOW",
            ThreatSeverity::Medium => "MEDIUM",
            ThreatSeverity::High => "HIGH",
            ThreatSeverity::Extreme => "EXTREME",
        };
        write!(f, "{}", name)
    }
}

/// What the sanitizer did about a threat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreatAction {
    /// Reported only
    Nothing,
    /// Neutralized in place
    Disarm,
    /// Deliberately left alone
    Ignore,
    /// Removed from the output
    Remove,
}

impl fmt::Display for ThreatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreatAction::Nothing => "NOTHING",
            ThreatAction::Disarm => "DISARM",
            ThreatAction::Ignore => "IGNORE",
            ThreatAction::Remove => "REMOVE",
        };
        write!(f, "{}", name)
    }
}

/// Immutable record of one removed or altered piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threat {
    kind: ThreatType,
    severity: ThreatSeverity,
    action: ThreatAction,
    location: String,
    details: String,
}

impl Threat {
    pub fn builder() -> ThreatBuilder {
        ThreatBuilder::default()
    }

    pub fn kind(&self) -> ThreatType {
        self.kind
    }

    pub fn severity(&self) -> ThreatSeverity {
        self.severity
    }

    pub fn action(&self) -> ThreatAction {
        self.action
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn details(&self) -> &str {
        &self.details
    }
}

impl fmt::Display for Threat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {} at '{}': {}",
            self.kind, self.severity, self.action, self.location, self.details
        )
    }
}

/// Fluent builder for `Threat`
///
/// Unset fields fall back to an unrecognized, low-severity threat with no
/// action taken, so a partially filled builder still yields a usable record.
#[derive(Debug, Clone)]
pub struct ThreatBuilder {
    kind: ThreatType,
    severity: ThreatSeverity,
    action: ThreatAction,
    location: String,
    details: String,
}

impl Default for ThreatBuilder {
    fn default() -> Self {
        Self {
            kind: ThreatType::UnrecognizedContent,
            severity: ThreatSeverity::Low,
            action: ThreatAction::Nothing,
            location: String::new(),
            details: String::new(),
        }
    }
}

impl ThreatBuilder {
    pub fn kind(mut self, kind: ThreatType) -> Self {
        self.kind = kind;
        self
    }

    pub fn severity(mut self, severity: ThreatSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn action(mut self, action: ThreatAction) -> Self {
        self.action = action;
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn build(self) -> Threat {
        Threat {
            kind: self.kind,
            severity: self.severity,
            action: self.action,
            location: self.location,
            details: self.details,
        }
    }
}
