use crate::codegen::DEFAULT_TICK;
use crate::locs::DEFAULT_DESCRIPTOR;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Contents of a `tinyprof.toml` file.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub instrument: InstrumentSettings,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct InstrumentSettings {
    pub mode: Mode,
    /// Loop descriptor, relative to the working directory
    pub descriptor: PathBuf,
    /// Name of the generated timestamp reader
    pub tick: String,
    pub report_stream: ReportStream,
    /// Re-parse instrumented output and warn about new syntax errors
    pub validate: bool,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            descriptor: PathBuf::from(DEFAULT_DESCRIPTOR),
            tick: DEFAULT_TICK.to_string(),
            report_stream: ReportStream::default(),
            validate: true,
        }
    }
}

/// How loops get their ids.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ids come from the loop descriptor; only loops directly in a function
    /// body are candidates.
    #[default]
    Descriptor,
    /// Every loop inside `main` is numbered in traversal order.
    Sequential,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Descriptor => write!(f, "descriptor"),
            Mode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Stream the generated report is printed to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportStream {
    #[default]
    Stderr,
    Stdout,
}

impl ReportStream {
    pub fn as_c_name(self) -> &'static str {
        match self {
            ReportStream::Stderr => "stderr",
            ReportStream::Stdout => "stdout",
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let settings = &self.instrument;

        if !is_c_identifier(&settings.tick) {
            issues.push(ValidationIssue::InvalidIdentifier {
                field: "instrument.tick",
                value: settings.tick.clone(),
            });
        }

        if settings.descriptor.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "instrument.descriptor",
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

/// Every problem found in one config, reported together.
#[derive(Error, Debug, Clone)]
#[error("{}", list_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn list_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Error, Debug, Clone)]
pub enum ValidationIssue {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("'{field}' must be a C identifier, got '{value}'")]
    InvalidIdentifier { field: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_c_identifier("tp_rdtsc"));
        assert!(is_c_identifier("_tick2"));
        assert!(!is_c_identifier("2tick"));
        assert!(!is_c_identifier("tick()"));
        assert!(!is_c_identifier(""));
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.instrument.mode, Mode::Descriptor);
        assert_eq!(config.instrument.descriptor, PathBuf::from("locs"));
        assert!(config.instrument.validate);
    }

    #[test]
    fn reports_every_issue() {
        let config = Config {
            instrument: InstrumentSettings {
                tick: "not valid".to_string(),
                descriptor: PathBuf::new(),
                ..InstrumentSettings::default()
            },
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err.to_string().contains("instrument.tick"));
        assert_eq!(err.to_string().lines().count(), 2);
    }
}
