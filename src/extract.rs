use crate::probe::{CommandProbe, TARGET_PLACEHOLDER};
use serde::{Deserialize, Serialize};
use std::num::ParseFloatError;
use thiserror::Error;

/// Metric being sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    /// CPU usage of a process, in percent.
    Cpu,
    /// Proportional set size of an app, in megabytes.
    Memory,
}

impl MetricKind {
    /// Extraction rule for the default probe output of this metric.
    pub fn extractor(self) -> Extractor {
        match self {
            // `top` line of the process: the %CPU column.
            Self::Cpu => Extractor::new(Selector::Target, 8, 1.0),
            // `dumpsys meminfo` line "TOTAL PSS: <kB> ...".
            Self::Memory => Extractor::new(Selector::Label("TOTAL PSS".to_string()), 2, 1000.0),
        }
    }

    /// Default probe command for this metric.
    pub fn default_probe(self) -> CommandProbe {
        let args: &[&str] = match self {
            Self::Cpu => &["shell", "top", "-p", TARGET_PLACEHOLDER, "-n", "1"],
            Self::Memory => &["shell", "dumpsys", "meminfo", TARGET_PLACEHOLDER],
        };
        CommandProbe::new("adb", args.iter().map(|arg| arg.to_string()).collect())
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Cpu => "%",
            Self::Memory => "MB",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cpu => "CPU usage",
            Self::Memory => "Memory usage (PSS)",
        }
    }
}

/// Rule locating the relevant line of the probe output.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Line containing the target identifier.
    Target,
    /// Line containing a fixed label.
    Label(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ExtractionError {
    #[error("no line contains {0:?}")]
    NoMatchingLine(String),

    #[error("field {index} missing from line with {len} fields")]
    MissingField { index: usize, len: usize },

    #[error("field {field:?} is not a number: {source}")]
    InvalidNumber {
        field: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("value {0} is not a finite non-negative number")]
    InvalidValue(f64),
}

/// Parses one reading out of raw probe output.
#[derive(Debug, Clone, PartialEq)]
pub struct Extractor {
    selector: Selector,
    field: usize,
    divisor: f64,
}

impl Extractor {
    /// `field` is the zero-based index of the whitespace-separated field
    /// holding the value; the parsed value is divided by `divisor`.
    pub fn new(selector: Selector, field: usize, divisor: f64) -> Self {
        Self {
            selector,
            field,
            divisor,
        }
    }

    /// Extract a reading from `raw`.
    ///
    /// Matching lines are tried in order and the first one that parses wins.
    /// If none parses, the error of the first matching line is returned.
    pub fn extract(&self, raw: &str, target: &str) -> Result<f64, ExtractionError> {
        let pattern = match &self.selector {
            Selector::Target => target,
            Selector::Label(label) => label.as_str(),
        };

        let mut first_err = None;
        for line in raw.lines().filter(|line| line.contains(pattern)) {
            match self.parse_line(line) {
                Ok(value) => {
                    log::debug!("matched line {:?}", line.trim());
                    return Ok(value);
                }
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }

        Err(first_err.unwrap_or_else(|| ExtractionError::NoMatchingLine(pattern.to_string())))
    }

    fn parse_line(&self, line: &str) -> Result<f64, ExtractionError> {
        let fields: Vec<_> = line.split_whitespace().collect();
        let field = fields
            .get(self.field)
            .ok_or(ExtractionError::MissingField {
                index: self.field,
                len: fields.len(),
            })?;

        let value: f64 = field
            .parse()
            .map_err(|source| ExtractionError::InvalidNumber {
                field: field.to_string(),
                source,
            })?;

        let value = value / self.divisor;
        if !value.is_finite() || value < 0.0 {
            return Err(ExtractionError::InvalidValue(value));
        }
        Ok(value)
    }
}
