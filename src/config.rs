//! Configuration types and validation for the sanitization engine

use std::{collections::HashSet, fmt, fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SanitizeError};

/// Default recursion bound for nested sanitization
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Largest member that will be inflated from an archive or package
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 256 * 1024 * 1024;

const MAX_DEPTH_CEILING: usize = 64;

/// Format sanitizers that can be enabled, in their default order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Ole2,
    Ooxml,
    Pdf,
    Rtf,
    Archive,
}

impl FormatKind {
    pub const ALL: [FormatKind; 5] = [
        FormatKind::Ole2,
        FormatKind::Ooxml,
        FormatKind::Pdf,
        FormatKind::Rtf,
        FormatKind::Archive,
    ];
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            FormatKind::Ole2 => "ole2",
            FormatKind::Ooxml => "ooxml",
            FormatKind::Pdf => "pdf",
            FormatKind::Rtf => "rtf",
            FormatKind::Archive => "archive",
        };
        write!(f, "{}", id)
    }
}

/// What to do with input no sanitizer claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnrecognizedPolicy {
    /// Copy the input to the output unchanged
    Passthrough,
    /// Fail with `NoApplicableSanitizer`
    Reject,
}

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleachConfig {
    pub max_depth: usize,
    pub max_entry_size: u64,
    pub unrecognized: UnrecognizedPolicy,
    pub formats: Vec<FormatKind>,
    pub timeout_secs: Option<u64>,
}

impl Default for BleachConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            unrecognized: UnrecognizedPolicy::Passthrough,
            formats: FormatKind::ALL.to_vec(),
            timeout_secs: None,
        }
    }
}

impl BleachConfig {
    /// Loads a configuration file; `.yaml`/`.yml` are read as YAML, `.json` as JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let config: BleachConfig = match extension.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| SanitizeError::ConfigError(format!("YAML parsing error: {}", e)))?,
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| SanitizeError::ConfigError(format!("JSON parsing error: {}", e)))?,
            _ => {
                return Err(SanitizeError::ConfigError(format!(
                    "Unsupported config file type: {}",
                    path.display()
                )))
            }
        };

        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(SanitizeError::ConfigError("max_depth must be at least 1".into()));
        }
        if self.max_depth > MAX_DEPTH_CEILING {
            return Err(SanitizeError::ConfigError(format!(
                "max_depth {} exceeds the ceiling of {}",
                self.max_depth, MAX_DEPTH_CEILING
            )));
        }
        if self.max_entry_size == 0 {
            return Err(SanitizeError::ConfigError("max_entry_size must be non-zero".into()));
        }
        if self.formats.is_empty() {
            return Err(SanitizeError::ConfigError("At least one format must be enabled".into()));
        }

        let mut seen = HashSet::new();
        for format in &self.formats {
            if !seen.insert(format) {
                return Err(SanitizeError::ConfigError(format!("Format '{}' listed twice", format)));
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(SanitizeError::ConfigError("timeout_secs must be non-zero".into()));
        }

        Ok(())
    }
}
